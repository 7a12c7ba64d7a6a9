//! UI hierarchy reconstruction from indented accessibility dumps
//!
//! XCUITest prints element trees one element per line with indentation as
//! nesting depth:
//!
//! ```text
//!  →Application, 0x600000c0c000, pid: 4242, label: 'MyApp'
//!     Window (Main), 0x600000c0c1c0, {{0.0, 0.0}, {390.0, 844.0}}
//!       Button, 0x600000c0c380, {{16.0, 50.0}, {80.0, 44.0}}, identifier: 'login', label: 'Log In'
//! ```
//!
//! Every non-blank line becomes one node. Nodes are stored in a flat array in
//! encounter order; that position is the permanent address of the element.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use xcauto_common::{Error, Result};

static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"label:\s*'((?:[^'\\]|\\.)*)'").expect("valid regex"));
static QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)""#).expect("valid regex"));
static QUOTED_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(identifier|value|placeholderValue|title):\s*'((?:[^'\\]|\\.)*)'")
        .expect("valid regex")
});
static PID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bpid:\s*(\d+)").expect("valid regex"));
static FRAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*(-?[\d.]+),\s*(-?[\d.]+)\s*\},\s*\{\s*(-?[\d.]+),\s*(-?[\d.]+)\s*\}\}")
        .expect("valid regex")
});
static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b0x[0-9a-fA-F]+\b").expect("valid regex"));
static DETAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^,(]*\(([^)]*)\)").expect("valid regex"));

/// One element of the hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiElementNode {
    pub element_type: String,
    pub label: Option<String>,
    pub attributes: BTreeMap<String, String>,
    /// Leading whitespace count
    pub indent: usize,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
    /// Type name of the parent element
    pub parent_type: Option<String>,
    pub flat_index: usize,
    pub raw: String,
}

/// Compact projection; details are looked up through `index`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlimUiNode {
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SlimUiNode>,
    pub index: usize,
}

/// Parsed hierarchy: flat arena plus top-level element indices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiHierarchy {
    nodes: Vec<UiElementNode>,
    roots: Vec<usize>,
}

impl UiHierarchy {
    pub fn parse(text: &str) -> Self {
        let mut hierarchy = Self::default();
        let mut stack: Vec<usize> = Vec::new();

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let indent = line.chars().take_while(|c| c.is_whitespace()).count();

            while let Some(top) = stack.last() {
                if hierarchy.nodes[*top].indent >= indent {
                    stack.pop();
                } else {
                    break;
                }
            }

            let index = hierarchy.nodes.len();
            let parent = stack.last().copied();
            let mut node = parse_line(line, indent, index);
            node.parent = parent;
            node.parent_type = parent.map(|p| hierarchy.nodes[p].element_type.clone());

            match parent {
                Some(p) => hierarchy.nodes[p].children.push(index),
                None => hierarchy.roots.push(index),
            }
            hierarchy.nodes.push(node);
            stack.push(index);
        }

        hierarchy
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[UiElementNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Full detail for a flat index
    pub fn element(&self, index: usize) -> Result<&UiElementNode> {
        self.nodes.get(index).ok_or_else(|| Error::NotFound {
            kind: "UI element".to_string(),
            id: index.to_string(),
            suggestion: (!self.nodes.is_empty())
                .then(|| format!("valid range is 0..{}", self.nodes.len() - 1)),
        })
    }

    pub fn find_by_identifier(&self, identifier: &str) -> Option<&UiElementNode> {
        self.nodes
            .iter()
            .find(|n| n.attributes.get("identifier").map(String::as_str) == Some(identifier))
    }

    /// Case-insensitive label containment
    pub fn find_by_label(&self, needle: &str) -> Vec<&UiElementNode> {
        let needle = needle.to_lowercase();
        self.nodes
            .iter()
            .filter(|n| {
                n.label
                    .as_deref()
                    .map(|l| l.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn slim(&self) -> Vec<SlimUiNode> {
        self.roots.iter().map(|r| self.slim_node(*r)).collect()
    }

    fn slim_node(&self, index: usize) -> SlimUiNode {
        let node = &self.nodes[index];
        SlimUiNode {
            element_type: node.element_type.clone(),
            label: node.label.clone(),
            children: node.children.iter().map(|c| self.slim_node(*c)).collect(),
            index,
        }
    }

    /// Write `<stem>.full.json` and `<stem>.slim.json` into `dir`
    pub fn write_snapshot(&self, dir: &Path, stem: &str) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(dir)?;
        let full = dir.join(format!("{}.full.json", stem));
        let slim = dir.join(format!("{}.slim.json", stem));
        std::fs::write(&full, serde_json::to_string_pretty(&self.nodes)?)?;
        std::fs::write(&slim, serde_json::to_string(&self.slim())?)?;
        Ok((full, slim))
    }

    /// Indented `[index] Type 'label'` outline
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            self.outline_node(*root, 0, &mut out);
        }
        out
    }

    fn outline_node(&self, index: usize, depth: usize, out: &mut String) {
        let node = &self.nodes[index];
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!("[{}] {}", index, node.element_type));
        if let Some(label) = &node.label {
            out.push_str(&format!(" '{}'", label));
        }
        if let Some(id) = node.attributes.get("identifier") {
            out.push_str(&format!(" #{}", id));
        }
        out.push('\n');
        for child in &node.children {
            self.outline_node(*child, depth + 1, out);
        }
    }
}

fn parse_line(line: &str, indent: usize, flat_index: usize) -> UiElementNode {
    let body = line.trim().trim_start_matches('→').trim_start();

    let element_type = body
        .split(|c| c == ',' || c == '(' || c == ':')
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Unknown")
        .to_string();

    let label = LABEL_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .or_else(|| {
            QUOTED_RE
                .captures(body)
                .and_then(|c| c.get(1).or_else(|| c.get(2)))
        })
        .map(|m| m.as_str().to_string());

    let mut attributes = BTreeMap::new();
    for caps in QUOTED_ATTR_RE.captures_iter(body) {
        attributes.insert(caps[1].to_string(), caps[2].to_string());
    }
    if let Some(caps) = PID_RE.captures(body) {
        attributes.insert("pid".to_string(), caps[1].to_string());
    }
    if let Some(caps) = FRAME_RE.captures(body) {
        attributes.insert(
            "frame".to_string(),
            format!("{{{{{}, {}}}, {{{}, {}}}}}", &caps[1], &caps[2], &caps[3], &caps[4]),
        );
    }
    if let Some(m) = ADDRESS_RE.find(body) {
        attributes.insert("address".to_string(), m.as_str().to_string());
    }
    if let Some(caps) = DETAIL_RE.captures(body) {
        attributes.insert("detail".to_string(), caps[1].trim().to_string());
    }

    UiElementNode {
        element_type,
        label,
        attributes,
        indent,
        children: Vec::new(),
        parent: None,
        parent_type: None,
        flat_index,
        raw: line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
 →Application, 0x600000c0c000, pid: 4242, label: 'MyApp'
    Window (Main), 0x600000c0c1c0, {{0.0, 0.0}, {390.0, 844.0}}
      Other, 0x600000c0c2a0, {{0.0, 0.0}, {390.0, 844.0}}
        TextField, 0x600000c0c310, {{16.0, 120.0}, {358.0, 34.0}}, identifier: 'username', placeholderValue: 'Email'
        Button, 0x600000c0c380, {{16.0, 170.0}, {80.0, 44.0}}, identifier: 'login', label: 'Log In'

      StaticText, 0x600000c0c3f0, {{16.0, 230.0}, {200.0, 20.0}}, label: 'Forgot password?'
";

    #[test]
    fn test_stack_builds_expected_shape() {
        let h = UiHierarchy::parse(DUMP);
        assert_eq!(h.len(), 6);
        assert_eq!(h.roots(), &[0]);

        let window = h.element(1).unwrap();
        assert_eq!(window.element_type, "Window");
        assert_eq!(window.children, vec![2, 5]);
        assert_eq!(window.parent_type.as_deref(), Some("Application"));

        let other = h.element(2).unwrap();
        assert_eq!(other.children, vec![3, 4]);
        assert_eq!(h.element(5).unwrap().parent, Some(1));
    }

    #[test]
    fn test_attributes_are_extracted() {
        let h = UiHierarchy::parse(DUMP);

        let app = h.element(0).unwrap();
        assert_eq!(app.element_type, "Application");
        assert_eq!(app.label.as_deref(), Some("MyApp"));
        assert_eq!(app.attributes["pid"], "4242");
        assert_eq!(app.attributes["address"], "0x600000c0c000");

        let window = h.element(1).unwrap();
        assert_eq!(window.attributes["detail"], "Main");
        assert_eq!(window.attributes["frame"], "{{0.0, 0.0}, {390.0, 844.0}}");
        assert_eq!(window.label, None);

        let field = h.find_by_identifier("username").unwrap();
        assert_eq!(field.attributes["placeholderValue"], "Email");
        // no label: token, first quoted string wins
        assert_eq!(field.label.as_deref(), Some("username"));

        let button = h.find_by_identifier("login").unwrap();
        assert_eq!(button.label.as_deref(), Some("Log In"));
        assert_eq!(h.find_by_label("forgot").len(), 1);
    }

    #[test]
    fn test_sibling_roots_and_out_of_range() {
        let h = UiHierarchy::parse("Window\n  Button\nAlert\n  Button\n");
        assert_eq!(h.roots(), &[0, 2]);
        assert_eq!(h.slim().len(), 2);
        assert!(matches!(h.element(4), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_slim_drops_attributes() {
        let h = UiHierarchy::parse(DUMP);
        let json = serde_json::to_string(&h.slim()).unwrap();
        assert!(json.contains(r#""type":"Application""#));
        assert!(!json.contains("0x600000c0c000"));
        assert!(!json.contains("frame"));
    }

    #[test]
    fn test_snapshot_files() {
        let dir = tempfile::tempdir().unwrap();
        let h = UiHierarchy::parse(DUMP);
        let (full, slim) = h.write_snapshot(dir.path(), "login").unwrap();

        let nodes: Vec<UiElementNode> =
            serde_json::from_str(&std::fs::read_to_string(full).unwrap()).unwrap();
        assert_eq!(nodes.len(), 6);
        let roots: Vec<SlimUiNode> =
            serde_json::from_str(&std::fs::read_to_string(slim).unwrap()).unwrap();
        assert_eq!(roots[0].children[0].index, 1);
    }

    #[test]
    fn test_outline() {
        let h = UiHierarchy::parse(DUMP);
        let outline = h.outline();
        assert!(outline.starts_with("[0] Application 'MyApp'\n"));
        assert!(outline.contains("      [4] Button 'Log In' #login\n"));
    }
}
