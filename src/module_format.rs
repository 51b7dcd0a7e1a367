//! The `<name,<name,` list format used to store module names in one string.

/// Parse `<aaa,<bbb,` into `["aaa", "bbb"]`.
pub fn parse_module_list(data: &str) -> Vec<String> {
    data.split('<')
        .filter(|item| !item.is_empty())
        .map(|item| item.trim_matches(',').to_string())
        .collect()
}

/// Format `["aaa", "bbb"]` as `<aaa,<bbb,`.
pub fn format_module_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|name| format!("<{},", name.as_ref()))
        .collect()
}
