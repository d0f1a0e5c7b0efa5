//! A restricted YAML subset parser for `SKILL.md` front matter: strings,
//! booleans, inline `[a, b, c]` sequences, and one level of nested mapping
//! (`metadata:`). Not a YAML 1.2 implementation — anchors, multi-document
//! streams, block sequences, and flow mappings are all out of scope.
//! Unknown top-level keys are rejected rather than silently ignored.

use skillforge_types::{Error, Result, SkillManifest, SkillMetadata};

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &[
    "name",
    "description",
    "license",
    "allowed-tools",
    "user-invocable",
    "model",
    "context",
    "metadata",
];

const KNOWN_METADATA_KEYS: &[&str] = &["author", "version", "tags"];

/// Splits a `SKILL.md` file into its front-matter block and Markdown body.
/// The front matter is delimited by lines containing exactly `---`.
pub fn split_front_matter(content: &str) -> Result<(String, String)> {
    let mut lines = content.lines();
    let first = lines.next().unwrap_or("");
    if first.trim() != "---" {
        return Err(Error::InvalidManifest(
            "SKILL.md must begin with a `---` front-matter delimiter".to_string(),
        ));
    }
    let mut front_matter_lines = Vec::new();
    let mut found_close = false;
    for line in lines.by_ref() {
        if line.trim() == "---" {
            found_close = true;
            break;
        }
        front_matter_lines.push(line);
    }
    if !found_close {
        return Err(Error::InvalidManifest(
            "unterminated front-matter block".to_string(),
        ));
    }
    let body: String = lines.collect::<Vec<_>>().join("\n");
    Ok((front_matter_lines.join("\n"), body.trim_start_matches('\n').to_string()))
}

#[derive(Debug, Clone)]
enum Scalar {
    Str(String),
    Bool(bool),
    List(Vec<String>),
}

fn parse_scalar(raw: &str) -> Scalar {
    let raw = raw.trim();
    if raw.starts_with('[') && raw.ends_with(']') {
        let inner = &raw[1..raw.len() - 1];
        let items = inner
            .split(',')
            .map(|s| unquote(s.trim()))
            .filter(|s| !s.is_empty())
            .collect();
        return Scalar::List(items);
    }
    match raw {
        "true" => Scalar::Bool(true),
        "false" => Scalar::Bool(false),
        _ => Scalar::Str(unquote(raw)),
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Parses a front-matter block into a `SkillManifest`, rejecting unknown
/// top-level keys and missing required fields.
pub fn parse_manifest(front_matter: &str) -> Result<SkillManifest> {
    let mut name: Option<String> = None;
    let mut description: Option<String> = None;
    let mut license: Option<String> = None;
    let mut allowed_tools: Vec<String> = Vec::new();
    let mut user_invocable = true;
    let mut model: Option<String> = None;
    let mut context: Option<String> = None;
    let mut metadata = SkillMetadata::default();

    let mut lines = front_matter.lines().peekable();
    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        if indent > 0 {
            // Nested lines are only valid directly under `metadata:`; a
            // stray indented line at the top level is a malformed document.
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(Error::InvalidManifest(format!(
                "malformed front-matter line (expected `key: value`): {line}"
            )));
        };
        let key = key.trim();
        if !KNOWN_TOP_LEVEL_KEYS.contains(&key) {
            return Err(Error::InvalidManifest(format!(
                "unknown front-matter key: {key}"
            )));
        }
        if key == "metadata" {
            while let Some(next) = lines.peek() {
                if next.trim().is_empty() {
                    lines.next();
                    continue;
                }
                let next_indent = next.len() - next.trim_start().len();
                if next_indent == 0 {
                    break;
                }
                let nested = lines.next().unwrap();
                let Some((nk, nv)) = nested.split_once(':') else {
                    return Err(Error::InvalidManifest(format!(
                        "malformed metadata line: {nested}"
                    )));
                };
                let nk = nk.trim();
                if !KNOWN_METADATA_KEYS.contains(&nk) {
                    return Err(Error::InvalidManifest(format!(
                        "unknown metadata key: {nk}"
                    )));
                }
                match (nk, parse_scalar(nv)) {
                    ("author", Scalar::Str(s)) => metadata.author = Some(s),
                    ("version", Scalar::Str(s)) => metadata.version = Some(s),
                    ("tags", Scalar::List(items)) => metadata.tags = items,
                    (k, _) => {
                        return Err(Error::InvalidManifest(format!(
                            "metadata.{k} has an unexpected value type"
                        )))
                    }
                }
            }
            continue;
        }
        match (key, parse_scalar(value)) {
            ("name", Scalar::Str(s)) => name = Some(s),
            ("description", Scalar::Str(s)) => description = Some(s),
            ("license", Scalar::Str(s)) => license = Some(s),
            ("allowed-tools", Scalar::List(items)) => allowed_tools = items,
            ("user-invocable", Scalar::Bool(b)) => user_invocable = b,
            ("model", Scalar::Str(s)) => model = Some(s),
            ("context", Scalar::Str(s)) => context = Some(s),
            (k, _) => {
                return Err(Error::InvalidManifest(format!(
                    "{k} has an unexpected value type"
                )))
            }
        }
    }

    let name = name.ok_or_else(|| Error::InvalidManifest("missing required field: name".to_string()))?;
    let description = description
        .ok_or_else(|| Error::InvalidManifest("missing required field: description".to_string()))?;
    if description.len() < 10 {
        return Err(Error::InvalidManifest(
            "description must be at least 10 characters".to_string(),
        ));
    }
    if name.is_empty() || name.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(Error::InvalidManifest(
            "name must be lowercase-hyphenated".to_string(),
        ));
    }

    Ok(SkillManifest {
        name,
        description,
        license,
        allowed_tools,
        user_invocable,
        model,
        context,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "---\nname: echo\ndescription: echoes the provided input\nallowed-tools: [bash, read]\nuser-invocable: true\nmetadata:\n  author: ops\n  version: \"1.0\"\n  tags: [demo, sample]\n---\n\nThis is the instructions body.\n";

    #[test]
    fn splits_front_matter_and_body() {
        let (front_matter, body) = split_front_matter(SAMPLE).unwrap();
        assert!(front_matter.contains("name: echo"));
        assert_eq!(body.trim(), "This is the instructions body.");
    }

    #[test]
    fn parses_full_manifest() {
        let (front_matter, _) = split_front_matter(SAMPLE).unwrap();
        let manifest = parse_manifest(&front_matter).unwrap();
        assert_eq!(manifest.name, "echo");
        assert_eq!(manifest.allowed_tools, vec!["bash", "read"]);
        assert!(manifest.user_invocable);
        assert_eq!(manifest.metadata.author.as_deref(), Some("ops"));
        assert_eq!(manifest.metadata.tags, vec!["demo", "sample"]);
    }

    #[test]
    fn rejects_missing_delimiter() {
        assert!(split_front_matter("name: echo\n---\nbody").is_err());
    }

    #[test]
    fn rejects_unterminated_block() {
        assert!(split_front_matter("---\nname: echo\n").is_err());
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let doc = "---\nname: echo\ndescription: echoes the provided input\nbogus: 1\n---\nbody";
        let (front_matter, _) = split_front_matter(doc).unwrap();
        assert!(parse_manifest(&front_matter).is_err());
    }

    #[test]
    fn rejects_short_description() {
        let doc = "---\nname: echo\ndescription: short\n---\nbody";
        let (front_matter, _) = split_front_matter(doc).unwrap();
        assert!(parse_manifest(&front_matter).is_err());
    }

    #[test]
    fn defaults_user_invocable_to_true() {
        let doc = "---\nname: echo\ndescription: echoes the provided input\n---\nbody";
        let (front_matter, _) = split_front_matter(doc).unwrap();
        let manifest = parse_manifest(&front_matter).unwrap();
        assert!(manifest.user_invocable);
    }
}
