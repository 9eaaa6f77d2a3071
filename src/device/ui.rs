//! UI Hierarchy
//!
//! A plain, serde-loadable UI tree implementing [`UiSnapshot`]. The CLI
//! uses it through `--snapshot` to evaluate branch and read steps against
//! a captured screen.
//!
//! XPath support is limited to a single descendant step:
//! `//Class`, `//Class[@attr='value']` and `//*[@attr='value']`, with
//! `attr` one of `text`, `resource-id`, `content-desc`, `class`, `bounds`.

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DeviceError, SnapshotProvider, UiElement, UiSnapshot};
use crate::workflow::model::{Selector, SelectorKind};

/// One node of the hierarchy.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UiNode {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub content_desc: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub bounds: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UiNode>,
}

impl UiNode {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = id.into();
        self
    }

    pub fn with_child(mut self, child: UiNode) -> Self {
        self.children.push(child);
        self
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "text" => Some(&self.text),
            "resource-id" | "resource_id" => Some(&self.resource_id),
            "content-desc" | "content_desc" => Some(&self.content_desc),
            "class" | "class_name" => Some(&self.class_name),
            "bounds" => Some(&self.bounds),
            _ => None,
        }
    }

    fn to_element(&self) -> UiElement {
        UiElement {
            text: self.text.clone(),
            resource_id: self.resource_id.clone(),
            content_desc: self.content_desc.clone(),
            class_name: self.class_name.clone(),
            bounds: self.bounds.clone(),
        }
    }

    /// Depth-first search in document order.
    fn find_first(&self, predicate: &dyn Fn(&UiNode) -> bool) -> Option<&UiNode> {
        if predicate(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_first(predicate))
    }
}

/// A captured UI hierarchy.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UiTree {
    pub nodes: Vec<UiNode>,
}

/// Parsed `//Class[@attr='value']` expression.
#[derive(Debug, PartialEq, Eq)]
struct XpathQuery<'a> {
    class: Option<&'a str>,
    predicate: Option<(&'a str, &'a str)>,
}

fn parse_xpath(expression: &str) -> Option<XpathQuery<'_>> {
    let rest = expression.trim().strip_prefix("//")?;
    let (class, predicate) = match rest.find('[') {
        Some(open) => {
            let inner = rest[open..].strip_prefix("[@")?.strip_suffix(']')?;
            let (attr, value) = inner.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))?;
            (&rest[..open], Some((attr.trim(), value)))
        }
        None => (rest, None),
    };

    if class.is_empty() {
        return None;
    }
    Some(XpathQuery {
        class: (class != "*").then_some(class),
        predicate,
    })
}

impl UiTree {
    pub fn new(nodes: Vec<UiNode>) -> Self {
        Self { nodes }
    }

    /// Loads a tree from a JSON or YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read snapshot '{}': {}", path.display(), e))?;
        let tree = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(tree)
    }

    fn search(&self, predicate: &dyn Fn(&UiNode) -> bool) -> Option<UiElement> {
        self.nodes
            .iter()
            .find_map(|n| n.find_first(predicate))
            .map(UiNode::to_element)
    }
}

impl UiSnapshot for UiTree {
    fn find(&self, selector: &Selector) -> Option<UiElement> {
        let value = selector.value.as_str();
        match selector.by {
            SelectorKind::Text => self.search(&|n: &UiNode| n.text == value),
            SelectorKind::ResourceId => self.search(&|n: &UiNode| n.resource_id == value),
            SelectorKind::ContentDesc => self.search(&|n: &UiNode| n.content_desc == value),
            SelectorKind::ClassName => self.search(&|n: &UiNode| n.class_name == value),
            SelectorKind::Xpath => self.find_xpath(value),
        }
    }

    fn find_xpath(&self, expression: &str) -> Option<UiElement> {
        let query = parse_xpath(expression)?;
        self.search(&|n: &UiNode| {
            query.class.map_or(true, |c| n.class_name == c)
                && query
                    .predicate
                    .map_or(true, |(attr, value)| n.attribute(attr) == Some(value))
        })
    }
}

/// Serves the same tree for every request.
#[derive(Debug, Clone)]
pub struct StaticSnapshotProvider {
    tree: Arc<UiTree>,
}

impl StaticSnapshotProvider {
    pub fn new(tree: UiTree) -> Self {
        Self {
            tree: Arc::new(tree),
        }
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshotProvider {
    async fn snapshot(&self, _serial: &str) -> Result<Box<dyn UiSnapshot>, DeviceError> {
        Ok(Box::new(self.tree.as_ref().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> UiTree {
        UiTree::new(vec![UiNode::new("android.widget.FrameLayout")
            .with_child(
                UiNode::new("android.widget.TextView")
                    .with_text("Welcome back")
                    .with_resource_id("app:id/title"),
            )
            .with_child(
                UiNode::new("android.widget.Button")
                    .with_text("OK")
                    .with_resource_id("app:id/ok"),
            )])
    }

    #[test]
    fn test_find_by_text_and_id() {
        let tree = sample_tree();
        let ok = tree.find(&Selector::new(SelectorKind::Text, "OK")).unwrap();
        assert_eq!(ok.resource_id, "app:id/ok");

        let title = tree
            .find(&Selector::new(SelectorKind::ResourceId, "app:id/title"))
            .unwrap();
        assert_eq!(title.text, "Welcome back");

        assert!(tree.find(&Selector::new(SelectorKind::Text, "Cancel")).is_none());
    }

    #[test]
    fn test_find_xpath() {
        let tree = sample_tree();
        let button = tree.find_xpath("//android.widget.Button").unwrap();
        assert_eq!(button.text, "OK");

        let by_attr = tree.find_xpath("//*[@resource-id='app:id/title']").unwrap();
        assert_eq!(by_attr.class_name, "android.widget.TextView");

        let both = tree
            .find_xpath("//android.widget.Button[@text=\"OK\"]")
            .unwrap();
        assert_eq!(both.resource_id, "app:id/ok");

        assert!(tree.find_xpath("//android.widget.Button[@text='No']").is_none());
    }

    #[test]
    fn test_lookup_dispatches_xpath() {
        let tree = sample_tree();
        let selector = Selector::new(SelectorKind::Xpath, "//*[@text='OK']");
        assert!(tree.lookup(&selector).is_some());
    }

    #[test]
    fn test_parse_xpath_rejects_unsupported() {
        assert!(parse_xpath("Button").is_none());
        assert!(parse_xpath("//").is_none());
        assert!(parse_xpath("//Button[text()='x']").is_none());
        assert_eq!(
            parse_xpath("//*"),
            Some(XpathQuery {
                class: None,
                predicate: None
            })
        );
    }

    #[test]
    fn test_load_yaml_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.yaml");
        fs::write(
            &path,
            "nodes:\n  - class_name: Root\n    children:\n      - text: Hello\n",
        )
        .unwrap();

        let tree = UiTree::load(&path).unwrap();
        assert!(tree.find(&Selector::new(SelectorKind::Text, "Hello")).is_some());
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticSnapshotProvider::new(sample_tree());
        let snapshot = provider.snapshot("serial").await.unwrap();
        assert!(snapshot.find(&Selector::new(SelectorKind::Text, "OK")).is_some());
    }
}
