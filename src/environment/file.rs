//! Parsing for `environment-file` contents: simple `KEY=value` lines, one
//! per line, `#`-comments and blank lines ignored. When several files are
//! listed, later files win on key collision (last-wins).

use std::collections::HashMap;
use std::path::Path;

pub fn parse(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            vars.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    vars
}

/// Reads and merges a list of environment files in order, last file wins.
pub fn load_merged(paths: &[impl AsRef<Path>]) -> std::io::Result<HashMap<String, String>> {
    let mut merged = HashMap::new();
    for path in paths {
        let contents = std::fs::read_to_string(path)?;
        merged.extend(parse(&contents));
    }
    Ok(merged)
}
