/// Shared prelude: drop the implicit cwd entry from `sys.path` and resolve
/// `module[:object]` into the backend object.
const LOAD_BACKEND: &str = r#"import importlib
import json
import os
import sys

if sys.path and sys.path[0] in ('', os.getcwd()):
    del sys.path[0]


def load_backend(spec):
    module_name, _, object_path = spec.partition(':')
    backend = importlib.import_module(module_name.strip())
    for attribute in filter(None, object_path.strip().split('.')):
        backend = getattr(backend, attribute)
    return backend
"#;

/// `python -c <script> <backend> <hook> <child-in> <child-out>`
const CALL_HOOK_BODY: &str = r#"

def open_inherited(raw, mode):
    if os.name == 'nt':
        import msvcrt
        flags = os.O_RDONLY if 'r' in mode else os.O_WRONLY
        return os.fdopen(msvcrt.open_osfhandle(int(raw), flags), mode, encoding='utf-8')
    return os.fdopen(int(raw), mode, encoding='utf-8')


def main():
    spec, hook, child_in, child_out = sys.argv[1:5]
    with open_inherited(child_in, 'r') as stream:
        payload = stream.read()
    arguments = json.loads(payload) if payload.strip() else {}
    backend = load_backend(spec)
    result = getattr(backend, hook)(**arguments)
    with open_inherited(child_out, 'w') as stream:
        json.dump(result, stream, default=str)


main()
"#;

/// `python -c <script> <backend>`: every callable attribute, one per line.
const LIST_HOOKS_BODY: &str = r#"

backend = load_backend(sys.argv[1])
for name in dir(backend):
    if callable(getattr(backend, name, None)):
        print(name)
"#;

pub(crate) fn call_hook_script() -> String {
    format!("{LOAD_BACKEND}{CALL_HOOK_BODY}")
}

pub(crate) fn list_hooks_script() -> String {
    format!("{LOAD_BACKEND}{LIST_HOOKS_BODY}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_share_the_backend_loader() {
        for script in [call_hook_script(), list_hooks_script()] {
            assert!(script.starts_with("import importlib\n"));
            assert!(script.contains("def load_backend(spec):"));
        }
        assert!(call_hook_script().contains("msvcrt.open_osfhandle"));
    }
}
