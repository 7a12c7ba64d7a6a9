//! Hierarchical test-result tree
//!
//! Nodes live in a flat arena with index links. Test cases in pre-order are
//! the canonical "index" addressing scheme used by every lookup.

use serde::{Deserialize, Serialize};
use xcauto_common::{Error, Result};

/// Kind of node in the test tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestNodeType {
    Suite,
    Case,
    /// Failure messages, devices, repetitions and similar payload nodes
    Detail,
}

impl TestNodeType {
    fn from_raw(raw: &str) -> Self {
        match raw {
            "Test Case" => Self::Case,
            "Test Plan" | "Unit test bundle" | "UI test bundle" | "Test Suite" | "Test Target" => {
                Self::Suite
            }
            _ => Self::Detail,
        }
    }
}

/// Outcome recorded for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    ExpectedFailure,
    Unknown,
}

impl TestStatus {
    fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some("Passed") => Self::Passed,
            Some("Failed") => Self::Failed,
            Some("Skipped") => Self::Skipped,
            Some("Expected Failure") => Self::ExpectedFailure,
            _ => Self::Unknown,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Passed => "✓",
            Self::Failed => "✗",
            Self::Skipped => "⊘",
            Self::ExpectedFailure => "≈",
            Self::Unknown => "?",
        }
    }
}

/// A node of the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestNode {
    pub name: String,
    pub node_type: TestNodeType,
    /// Type string as reported by xcresulttool
    pub raw_type: String,
    pub node_identifier: Option<String>,
    pub result: TestStatus,
    /// Seconds
    pub duration: Option<f64>,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
}

/// xcresulttool `get test-results tests` node
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTestNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    node_type: String,
    #[serde(default)]
    node_identifier: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    duration: Option<serde_json::Value>,
    #[serde(default)]
    duration_in_seconds: Option<f64>,
    #[serde(default)]
    children: Vec<RawTestNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTests {
    #[serde(default)]
    test_nodes: Vec<RawTestNode>,
}

/// Read-only tree for one result bundle
#[derive(Debug, Clone, Serialize)]
pub struct TestTree {
    nodes: Vec<TestNode>,
    root: usize,
    /// Test cases in pre-order
    cases: Vec<usize>,
}

impl TestTree {
    /// Parse the JSON printed by `xcresulttool get test-results tests`
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawTests = serde_json::from_str(json)
            .map_err(|e| Error::unexpected("xcresulttool", format!("test tree: {}", e)))?;
        Ok(Self::from_raw(raw.test_nodes))
    }

    fn from_raw(mut top: Vec<RawTestNode>) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: 0,
            cases: Vec::new(),
        };

        // Exactly one root per bundle
        let root = if top.len() == 1 {
            top.remove(0)
        } else {
            RawTestNode {
                name: "All Tests".to_string(),
                node_type: "Test Plan".to_string(),
                node_identifier: None,
                result: None,
                duration: None,
                duration_in_seconds: None,
                children: top,
            }
        };
        tree.root = tree.insert(root, None);
        tree
    }

    fn insert(&mut self, raw: RawTestNode, parent: Option<usize>) -> usize {
        let id = self.nodes.len();
        let node_type = TestNodeType::from_raw(&raw.node_type);
        let duration = raw
            .duration_in_seconds
            .or_else(|| raw.duration.as_ref().and_then(parse_duration));

        self.nodes.push(TestNode {
            name: raw.name,
            node_type,
            raw_type: raw.node_type,
            node_identifier: raw.node_identifier,
            result: TestStatus::from_raw(raw.result.as_deref()),
            duration,
            children: Vec::new(),
            parent,
        });
        if node_type == TestNodeType::Case {
            self.cases.push(id);
        }

        for child in raw.children {
            let child_id = self.insert(child, Some(id));
            self.nodes[id].children.push(child_id);
        }
        id
    }

    pub fn root(&self) -> &TestNode {
        &self.nodes[self.root]
    }

    pub fn root_id(&self) -> usize {
        self.root
    }

    pub fn node(&self, id: usize) -> Option<&TestNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Test cases in pre-order, paired with their position index
    pub fn test_cases(&self) -> impl Iterator<Item = (usize, &TestNode)> {
        self.cases.iter().enumerate().map(|(i, id)| (i, &self.nodes[*id]))
    }

    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    /// Position of a node in the test-case index, if it is a case
    pub fn case_index_of(&self, id: usize) -> Option<usize> {
        self.cases.iter().position(|c| *c == id)
    }

    pub fn failed_cases(&self) -> Vec<(usize, &TestNode)> {
        self.test_cases()
            .filter(|(_, n)| n.result == TestStatus::Failed)
            .collect()
    }

    /// Names from the root down to `id`
    pub fn path_of(&self, id: usize) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(i) = current {
            let Some(node) = self.nodes.get(i) else { break };
            path.push(node.name.as_str());
            current = node.parent;
        }
        path.reverse();
        path
    }

    /// Failure messages recorded under a test case
    pub fn failure_messages(&self, id: usize) -> Vec<&str> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|c| self.nodes.get(*c))
            .filter(|c| c.raw_type == "Failure Message")
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Resolve a node by test-case index, exact identifier, or substring.
    ///
    /// Returns the arena id of the matched node.
    pub fn find_node(&self, query: &str) -> Result<usize> {
        let query = query.trim();

        if let Ok(index) = query.parse::<i64>() {
            if index < 0 || index as usize >= self.cases.len() {
                return Err(Error::NotFound {
                    kind: "Test index".to_string(),
                    id: query.to_string(),
                    suggestion: (!self.cases.is_empty())
                        .then(|| format!("valid range is 0..{}", self.cases.len() - 1)),
                });
            }
            return Ok(self.cases[index as usize]);
        }

        if let Some(id) = self
            .nodes
            .iter()
            .position(|n| n.node_identifier.as_deref() == Some(query))
        {
            return Ok(id);
        }

        self.nodes
            .iter()
            .position(|n| {
                n.node_identifier
                    .as_deref()
                    .map(|ident| ident.contains(query))
                    .unwrap_or(false)
                    || n.name.contains(query)
            })
            .ok_or_else(|| Error::not_found("Test", query))
    }

    /// Indented outline with case indices, for human and model consumption
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_node(self.root, 0, &mut out);
        out
    }

    fn render_node(&self, id: usize, depth: usize, out: &mut String) {
        let node = &self.nodes[id];
        if node.node_type == TestNodeType::Detail {
            return;
        }
        let indent = "  ".repeat(depth);
        let index = self
            .case_index_of(id)
            .map(|i| format!("[{}] ", i))
            .unwrap_or_default();
        let duration = node
            .duration
            .map(|d| format!(" ({:.3}s)", d))
            .unwrap_or_default();
        out.push_str(&format!(
            "{}{} {}{}{}\n",
            indent,
            node.result.symbol(),
            index,
            node.name,
            duration
        ));
        for child in &node.children {
            self.render_node(*child, depth + 1, out);
        }
    }
}

/// Accepts `0.12s`, `0,12s`, `1m 5s`, or a bare number of seconds
fn parse_duration(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let mut total = 0.0;
            let mut matched = false;
            for part in s.split_whitespace() {
                let part = part.replace(',', ".");
                if let Some(minutes) = part.strip_suffix('m') {
                    total += minutes.parse::<f64>().ok()? * 60.0;
                    matched = true;
                } else if let Some(seconds) = part.strip_suffix('s') {
                    total += seconds.parse::<f64>().ok()?;
                    matched = true;
                } else {
                    total += part.parse::<f64>().ok()?;
                    matched = true;
                }
            }
            matched.then_some(total)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
      "testNodes": [{
        "name": "MyAppTests", "nodeType": "Unit test bundle", "result": "Failed",
        "children": [
          { "name": "LoginTests", "nodeType": "Test Suite", "nodeIdentifier": "LoginTests", "result": "Failed",
            "children": [
              { "name": "testValidLogin()", "nodeType": "Test Case", "nodeIdentifier": "LoginTests/testValidLogin()", "result": "Passed", "duration": "0.12s" },
              { "name": "testBadPassword()", "nodeType": "Test Case", "nodeIdentifier": "LoginTests/testBadPassword()", "result": "Failed", "duration": "1,5s",
                "children": [ { "name": "XCTAssertEqual failed: (\"a\") is not equal to (\"b\")", "nodeType": "Failure Message", "result": "Failed" } ] }
            ] },
          { "name": "ProfileTests", "nodeType": "Test Suite", "nodeIdentifier": "ProfileTests", "result": "Passed",
            "children": [
              { "name": "testAvatar()", "nodeType": "Test Case", "nodeIdentifier": "ProfileTests/testAvatar()", "result": "Skipped", "durationInSeconds": 0.01 }
            ] }
        ]
      }]
    }"#;

    #[test]
    fn test_index_addresses_cases_in_preorder() {
        let tree = TestTree::from_json(SAMPLE).unwrap();
        assert_eq!(tree.case_count(), 3);

        let names: Vec<&str> = tree.test_cases().map(|(_, n)| n.name.as_str()).collect();
        assert_eq!(names, vec!["testValidLogin()", "testBadPassword()", "testAvatar()"]);

        for i in 0..tree.case_count() {
            let id = tree.find_node(&i.to_string()).unwrap();
            assert_eq!(tree.node(id).unwrap().name, names[i]);
        }
    }

    #[test]
    fn test_out_of_range_and_negative_indices() {
        let tree = TestTree::from_json(SAMPLE).unwrap();
        assert!(matches!(tree.find_node("3"), Err(Error::NotFound { .. })));
        assert!(matches!(tree.find_node("-1"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_identifier_then_substring_lookup() {
        let tree = TestTree::from_json(SAMPLE).unwrap();
        let exact = tree.find_node("LoginTests/testBadPassword()").unwrap();
        assert_eq!(tree.node(exact).unwrap().result, TestStatus::Failed);

        let partial = tree.find_node("testAvatar").unwrap();
        assert_eq!(tree.node(partial).unwrap().name, "testAvatar()");

        assert!(tree.find_node("NoSuchTest").is_err());
    }

    #[test]
    fn test_durations_and_failures() {
        let tree = TestTree::from_json(SAMPLE).unwrap();
        let id = tree.find_node("1").unwrap();
        assert_eq!(tree.node(id).unwrap().duration, Some(1.5));
        assert_eq!(tree.failure_messages(id).len(), 1);
        assert_eq!(tree.failed_cases().len(), 1);
        assert_eq!(
            tree.path_of(id),
            vec!["MyAppTests", "LoginTests", "testBadPassword()"]
        );
    }

    #[test]
    fn test_multiple_top_level_nodes_get_single_root() {
        let json = r#"{"testNodes":[
            {"name":"A","nodeType":"Unit test bundle","children":[{"name":"t1()","nodeType":"Test Case","result":"Passed"}]},
            {"name":"B","nodeType":"UI test bundle","children":[{"name":"t2()","nodeType":"Test Case","result":"Passed"}]}
        ]}"#;
        let tree = TestTree::from_json(json).unwrap();
        assert_eq!(tree.root().name, "All Tests");
        assert_eq!(tree.root().children.len(), 2);
        assert_eq!(tree.case_count(), 2);
    }

    #[test]
    fn test_render_marks_indices() {
        let tree = TestTree::from_json(SAMPLE).unwrap();
        let text = tree.render();
        assert!(text.contains("✗ [1] testBadPassword()"));
        assert!(!text.contains("XCTAssertEqual"));
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration(&serde_json::json!("1m 5s")), Some(65.0));
        assert_eq!(parse_duration(&serde_json::json!(2.5)), Some(2.5));
        assert_eq!(parse_duration(&serde_json::json!("n/a")), None);
    }
}
