use serde::{Deserialize, Serialize};

/// RFC 822 style header block as used by `METADATA`, `PKG-INFO` and `WHEEL`.
///
/// Header names compare case-insensitively and keep their file order;
/// repeated headers (`Requires-Dist`, `Tag`) are all retained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreMetadata {
    headers: Vec<(String, String)>,
    #[serde(default)]
    body: Option<String>,
}

impl CoreMetadata {
    pub fn parse(text: &str) -> Self {
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut lines = text.lines();
        let mut body = None;

        while let Some(line) = lines.next() {
            if line.trim().is_empty() {
                let rest: Vec<&str> = lines.by_ref().collect();
                let joined = rest.join("\n");
                if !joined.trim().is_empty() {
                    body = Some(joined);
                }
                break;
            }
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = headers.last_mut() {
                    value.push('\n');
                    value.push_str(line.trim());
                }
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Self { headers, body }
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn name(&self) -> Option<&str> {
        self.get("Name")
    }

    pub fn version(&self) -> Option<&str> {
        self.get("Version")
    }

    pub fn requires_dist(&self) -> Vec<&str> {
        self.get_all("Requires-Dist")
    }

    /// Contacts from `Maintainer-email`, falling back to `Author-email`.
    pub fn maintainers(&self) -> Vec<String> {
        let mut values = self.get_all("Maintainer-email");
        if values.is_empty() {
            values = self.get_all("Author-email");
        }
        let mut out: Vec<String> = Vec::new();
        for entry in values
            .iter()
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
        {
            if !out.iter().any(|known| known == entry) {
                out.push(entry.to_string());
            }
        }
        out
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}
