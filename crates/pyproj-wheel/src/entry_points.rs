/// `name = module:callable` from a `console_scripts` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleScriptSpec {
    pub script_name: String,
    pub entry_reference: String,
}

impl ConsoleScriptSpec {
    pub fn module(&self) -> &str {
        self.entry_reference
            .split_once(':')
            .map_or(self.entry_reference.as_str(), |(module, _)| module)
            .trim()
    }

    /// Dotted attribute path after the colon, if any.
    pub fn callable(&self) -> Option<&str> {
        self.entry_reference
            .split_once(':')
            .map(|(_, callable)| callable.trim())
            .filter(|callable| !callable.is_empty())
    }
}

/// INI-style `entry_points.txt`, keeping section and key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPoints {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl EntryPoints {
    pub fn parse(text: &str) -> Self {
        let mut sections: Vec<(String, Vec<(String, String)>)> = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                let name = trimmed
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .trim()
                    .to_string();
                sections.push((name, Vec::new()));
                continue;
            }
            let Some((_, entries)) = sections.last_mut() else {
                continue;
            };
            if let Some((name, target)) = trimmed.split_once('=') {
                entries.push((name.trim().to_string(), target.trim().to_string()));
            }
        }
        Self { sections }
    }

    pub fn section(&self, name: &str) -> Option<&[(String, String)]> {
        self.sections
            .iter()
            .find(|(section, _)| section == name)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    pub fn console_scripts(&self) -> Vec<ConsoleScriptSpec> {
        self.section("console_scripts")
            .unwrap_or_default()
            .iter()
            .map(|(name, target)| ConsoleScriptSpec {
                script_name: name.clone(),
                // drop trailing `[extras]`
                entry_reference: target
                    .split_whitespace()
                    .next()
                    .unwrap_or(target)
                    .split('[')
                    .next()
                    .unwrap_or(target)
                    .trim()
                    .to_string(),
            })
            .collect()
    }
}
