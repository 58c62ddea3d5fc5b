//! Sieve text for "file this sender into the bulk folder" rules.

pub const DEFAULT_SCRIPT_NAME: &str = "bulk-manager-rules";
pub const DEFAULT_FOLDER: &str = "Bulk";
pub const CONTENT_TYPE: &str = "application/sieve";

const REQUIRE_FILEINTO: &str = "require [\"fileinto\"];";
const HEADER: &str = "# Auto-generated rules by bulkman";

/// Escape a value for a Sieve quoted string.
pub fn quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn rule_block(sender: &str, folder: &str) -> String {
    let label = sender.replace(['\r', '\n'], " ");
    format!(
        "# Rule for {label}\nif address :is \"from\" \"{}\" {{\n    fileinto \"{}\";\n    stop;\n}}\n",
        quote(sender),
        quote(folder)
    )
}

fn requires_fileinto(source: &str) -> bool {
    source.lines().any(|l| {
        let l = l.trim_start();
        l.starts_with("require") && l.contains("\"fileinto\"")
    })
}

/// Append a rule for `sender` to `existing`, or start a new script.
pub fn append_rule(existing: Option<&str>, sender: &str, folder: &str) -> String {
    let block = rule_block(sender, folder);

    let Some(source) = existing.filter(|s| !s.trim().is_empty()) else {
        return format!("{REQUIRE_FILEINTO}\n\n{HEADER}\n\n{block}");
    };

    let mut out = if requires_fileinto(source) {
        source.to_string()
    } else {
        format!("{REQUIRE_FILEINTO}\n{source}")
    };
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&block);
    out
}
