//! Level-description node access.
//!
//! The tile loader never touches a parser directly: it walks a tree of named
//! nodes through `LevelNode` and reads scalar leaves as strings. Numbers are
//! extracted with `parse_or_zero`, so a missing or malformed field degrades to
//! zero instead of aborting the load.
//!
//! Level files are JSON element trees. An element with children is an object,
//! a repeated element is an array, and a leaf is a string or number:
//!
//! ```json
//! { "tileSetList": { "tileset": [ { "index": 0, "tileWidth": "32" } ] } }
//! ```

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const ROOT_NAME: &str = "level";

/// A node in a level-description tree.
pub trait LevelNode: Sized {
    /// First child element called `name`.
    fn first_child(&self, name: &str) -> Option<Self>;

    /// Next element after this one that is also called `name`.
    fn next_sibling(&self, name: &str) -> Option<Self>;

    /// Text content of a simple `<tag>value</tag>` element.
    fn text(&self) -> Option<String>;

    /// Scalar attribute on this element.
    fn attribute(&self, name: &str) -> Option<String>;

    /// All child elements called `name`, in document order.
    fn children(&self, name: &str) -> Vec<Self> {
        let mut out = Vec::new();
        let mut next = self.first_child(name);
        while let Some(node) = next {
            next = node.next_sibling(name);
            out.push(node);
        }
        out
    }
}

/// Text of the child element `name`, or an empty string.
pub fn item_value<N: LevelNode>(node: &N, name: &str) -> String {
    node.first_child(name)
        .and_then(|child| child.text())
        .or_else(|| node.attribute(name))
        .unwrap_or_default()
}

/// Numeric value of the child element `name`; zero when missing or malformed.
pub fn item_number<N: LevelNode, T: FromStr + Default>(node: &N, name: &str) -> T {
    let raw = item_value(node, name);
    if !raw.is_empty() && raw.trim().parse::<T>().is_err() {
        log::debug!("Level field '{name}' has malformed value '{raw}', using 0");
    }
    parse_or_zero(&raw)
}

pub fn parse_or_zero<T: FromStr + Default>(raw: &str) -> T {
    raw.trim().parse().unwrap_or_default()
}

/// `LevelNode` over a parsed JSON element tree.
#[derive(Debug, Clone, Copy)]
pub struct JsonNode<'a> {
    name: &'a str,
    value: &'a Value,
    siblings: &'a [Value],
    position: usize,
}

impl<'a> JsonNode<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    fn at(name: &'a str, siblings: &'a [Value], position: usize) -> Option<Self> {
        siblings.get(position).map(|value| Self {
            name,
            value,
            siblings,
            position,
        })
    }
}

impl<'a> LevelNode for JsonNode<'a> {
    fn first_child(&self, name: &str) -> Option<Self> {
        let Value::Object(map) = self.value else {
            return None;
        };
        let (key, child) = map.iter().find(|(key, _)| key.as_str() == name)?;
        match child {
            Value::Array(items) => Self::at(key.as_str(), items.as_slice(), 0),
            other => Self::at(key.as_str(), std::slice::from_ref(other), 0),
        }
    }

    fn next_sibling(&self, name: &str) -> Option<Self> {
        if self.name != name {
            return None;
        }
        Self::at(self.name, self.siblings, self.position + 1)
    }

    fn text(&self) -> Option<String> {
        scalar_text(self.value)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match self.value {
            Value::Object(map) => map.get(name).and_then(scalar_text),
            _ => None,
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A level file held in memory.
#[derive(Debug, Clone)]
pub struct LevelDocument {
    path: Option<PathBuf>,
    root: Value,
}

impl LevelDocument {
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        let root: Value =
            serde_json::from_str(raw).map_err(|e| format!("Failed to parse level JSON: {e}"))?;
        validate_level(&root)?;
        Ok(Self { path: None, root })
    }

    pub fn root(&self) -> JsonNode<'_> {
        JsonNode {
            name: ROOT_NAME,
            value: &self.root,
            siblings: std::slice::from_ref(&self.root),
            position: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Directory that image names inside the level resolve against.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

pub fn load_level_from_path(path: &Path) -> Result<LevelDocument, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read level file {}: {e}", path.display()))?;
    let root: Value = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse level JSON {}: {e}", path.display()))?;
    validate_level(&root)?;
    Ok(LevelDocument {
        path: Some(path.to_path_buf()),
        root,
    })
}

fn validate_level(root: &Value) -> Result<(), String> {
    if !root.is_object() {
        return Err("Level validation failed: root element must be an object".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file_path(name_hint: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "tsr_level_test_{}_{}_{}.json",
            name_hint,
            std::process::id(),
            nanos
        ))
    }

    const SAMPLE: &str = r#"
    {
      "tileSetList": {
        "tileset": [
          { "index": 0, "identifier": "ground", "tileWidth": "32" },
          { "index": -1, "identifier": "sky", "tileWidth": 64 }
        ]
      },
      "title": "demo"
    }
    "#;

    #[test]
    fn walks_repeated_elements_in_order() {
        let doc = LevelDocument::from_json_str(SAMPLE).expect("sample parses");
        let list = doc.root().first_child("tileSetList").expect("list exists");
        let sets = list.children("tileset");
        assert_eq!(sets.len(), 2);
        assert_eq!(item_value(&sets[0], "identifier"), "ground");
        assert_eq!(item_value(&sets[1], "identifier"), "sky");
        assert!(sets[1].next_sibling("tileset").is_none());
    }

    #[test]
    fn next_sibling_requires_matching_name() {
        let doc = LevelDocument::from_json_str(SAMPLE).expect("sample parses");
        let first = doc
            .root()
            .first_child("tileSetList")
            .and_then(|l| l.first_child("tileset"))
            .expect("tileset exists");
        assert!(first.next_sibling("map").is_none());
        assert!(first.next_sibling("tileset").is_some());
    }

    #[test]
    fn single_element_is_one_child() {
        let doc = LevelDocument::from_json_str(SAMPLE).expect("sample parses");
        let titles = doc.root().children("title");
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].text().as_deref(), Some("demo"));
    }

    #[test]
    fn numbers_read_from_strings_and_numbers() {
        let doc = LevelDocument::from_json_str(SAMPLE).expect("sample parses");
        let sets = doc.root().first_child("tileSetList").expect("list").children("tileset");
        assert_eq!(item_number::<_, u32>(&sets[0], "tileWidth"), 32);
        assert_eq!(item_number::<_, u32>(&sets[1], "tileWidth"), 64);
        assert_eq!(item_number::<_, i32>(&sets[1], "index"), -1);
    }

    #[test]
    fn missing_or_malformed_numbers_degrade_to_zero() {
        let doc = LevelDocument::from_json_str(
            r#"{ "tileWidth": "wide", "tileHeight": 1.5, "nested": { "a": 1 } }"#,
        )
        .expect("parses");
        let root = doc.root();
        assert_eq!(item_number::<_, u32>(&root, "tileWidth"), 0);
        assert_eq!(item_number::<_, u32>(&root, "tileHeight"), 0);
        assert_eq!(item_number::<_, u32>(&root, "absent"), 0);
        assert_eq!(item_number::<_, u32>(&root, "nested"), 0);
        assert_eq!(parse_or_zero::<i32>(" -7 "), -7);
    }

    #[test]
    fn attribute_reads_scalar_keys_only() {
        let doc = LevelDocument::from_json_str(r#"{ "id": 3, "list": [1, 2] }"#).expect("parses");
        assert_eq!(doc.root().attribute("id").as_deref(), Some("3"));
        assert_eq!(doc.root().attribute("list"), None);
    }

    #[test]
    fn rejects_non_object_root() {
        let err = LevelDocument::from_json_str("[1, 2]").expect_err("array root fails");
        assert!(err.contains("root element must be an object"));
    }

    #[test]
    fn load_level_from_path_records_base_dir() {
        let path = temp_file_path("base_dir");
        fs::write(&path, SAMPLE).expect("write temp level");
        let doc = load_level_from_path(&path).expect("level loads");
        assert_eq!(doc.path(), Some(path.as_path()));
        assert_eq!(doc.base_dir(), std::env::temp_dir());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn load_level_from_path_reports_parse_errors() {
        let path = temp_file_path("malformed");
        fs::write(&path, "{ not json").expect("write temp level");
        let err = load_level_from_path(&path).expect_err("malformed level fails");
        assert!(err.contains("Failed to parse level JSON"));
        let _ = fs::remove_file(path);
    }
}
