use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::story::error::StoryError;

/// Label used for an option that arrives without one.
pub const DEFAULT_OPTION_TEXT: &str = "Continue";

// ---------------------------------------------------------------------------
// Transfer shape, as the story model returns it
// ---------------------------------------------------------------------------

/// The structured document the story model is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryLlmResponse {
    #[serde(default)]
    pub title: Option<String>,
    pub root_node: NodeInput,
}

/// A node is accepted either in its typed form or as a loose JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeInput {
    Typed(StoryNodeLlm),
    Raw(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryNodeLlm {
    pub content: String,
    #[serde(default)]
    pub is_ending: bool,
    #[serde(default)]
    pub is_winning_ending: bool,
    #[serde(default)]
    pub options: Vec<OptionInput>,
}

/// Same tolerance as [`NodeInput`], one level down.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionInput {
    Typed(StoryOptionLlm),
    Raw(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryOptionLlm {
    #[serde(default)]
    pub text: Option<String>,
    pub next_node: Box<NodeInput>,
}

// ---------------------------------------------------------------------------
// Canonical shape, what the tree builder consumes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StoryDraft {
    pub title: String,
    pub root: DraftNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftNode {
    pub content: String,
    pub is_ending: bool,
    pub is_winning_ending: bool,
    pub options: Vec<DraftOption>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftOption {
    pub text: String,
    pub next: DraftNode,
}

impl DraftNode {
    /// Total nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.options.iter().map(|o| o.next.count()).sum::<usize>()
    }
}

impl StoryLlmResponse {
    /// Convert the transfer document into the canonical draft, checking node
    /// invariants on the way. Nothing downstream sees [`NodeInput`].
    pub fn normalize(self, theme: &str) -> Result<StoryDraft, StoryError> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Adventure: {theme}"));
        let root = normalize_node(self.root_node, "rootNode")?;
        Ok(StoryDraft { title, root })
    }
}

fn normalize_node(input: NodeInput, at: &str) -> Result<DraftNode, StoryError> {
    let typed = match input {
        NodeInput::Typed(node) => node,
        NodeInput::Raw(value) => node_from_value(value, at)?,
    };

    let options = typed
        .options
        .into_iter()
        .enumerate()
        .map(|(i, option)| normalize_option(option, &format!("{at}.options[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;

    if typed.is_winning_ending && !typed.is_ending {
        return Err(StoryError::Malformed(format!(
            "{at} is a winning ending but isEnding is false"
        )));
    }
    if typed.is_ending && !options.is_empty() {
        return Err(StoryError::Malformed(format!(
            "{at} is an ending but has {} option(s)",
            options.len()
        )));
    }
    if !typed.is_ending && options.is_empty() {
        return Err(StoryError::Malformed(format!(
            "{at} is not an ending but has no options"
        )));
    }

    Ok(DraftNode {
        content: typed.content,
        is_ending: typed.is_ending,
        is_winning_ending: typed.is_winning_ending,
        options,
    })
}

fn normalize_option(input: OptionInput, at: &str) -> Result<DraftOption, StoryError> {
    let (text, next) = match input {
        OptionInput::Typed(option) => (option.text, *option.next_node),
        OptionInput::Raw(value) => {
            let mut map = into_object(value, at)?;
            let text = match map.remove("text") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s),
                Some(other) => {
                    return Err(StoryError::Malformed(format!(
                        "{at}.text must be a string, got {other}"
                    )))
                }
            };
            let next = match map.remove("nextNode") {
                None | Some(Value::Null) => {
                    return Err(StoryError::Malformed(format!("{at} has no nextNode")))
                }
                Some(value) => NodeInput::Raw(value),
            };
            (text, next)
        }
    };

    let text = text
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_OPTION_TEXT.to_string());
    let next = normalize_node(next, &format!("{at}.nextNode"))?;
    Ok(DraftOption { text, next })
}

fn node_from_value(value: Value, at: &str) -> Result<StoryNodeLlm, StoryError> {
    let mut map = into_object(value, at)?;

    let content = match map.remove("content") {
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(StoryError::Malformed(format!(
                "{at}.content must be a string, got {other}"
            )))
        }
        None => return Err(StoryError::Malformed(format!("{at} has no content"))),
    };
    let is_ending = loose_bool(map.remove("isEnding"), &format!("{at}.isEnding"))?;
    let is_winning_ending = loose_bool(
        map.remove("isWinningEnding"),
        &format!("{at}.isWinningEnding"),
    )?;
    let options = match map.remove("options") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.into_iter().map(OptionInput::Raw).collect(),
        Some(other) => {
            return Err(StoryError::Malformed(format!(
                "{at}.options must be a list, got {other}"
            )))
        }
    };

    Ok(StoryNodeLlm {
        content,
        is_ending,
        is_winning_ending,
        options,
    })
}

fn into_object(value: Value, at: &str) -> Result<Map<String, Value>, StoryError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoryError::Malformed(format!(
            "{at} must be an object, got {other}"
        ))),
    }
}

/// Booleans sometimes come back as strings from looser models.
fn loose_bool(value: Option<Value>, at: &str) -> Result<bool, StoryError> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
        Some(other) => Err(StoryError::Malformed(format!(
            "{at} must be a boolean, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ending(content: &str, winning: bool) -> StoryNodeLlm {
        StoryNodeLlm {
            content: content.into(),
            is_ending: true,
            is_winning_ending: winning,
            options: Vec::new(),
        }
    }

    #[test]
    fn test_typed_and_raw_inputs_normalize_alike() {
        let typed = StoryLlmResponse {
            title: Some("X".into()),
            root_node: NodeInput::Typed(StoryNodeLlm {
                content: "c".into(),
                is_ending: false,
                is_winning_ending: false,
                options: vec![OptionInput::Typed(StoryOptionLlm {
                    text: Some("go".into()),
                    next_node: Box::new(NodeInput::Typed(ending("end", true))),
                })],
            }),
        };
        let raw = StoryLlmResponse {
            title: Some("X".into()),
            root_node: NodeInput::Raw(json!({
                "content": "c",
                "isEnding": false,
                "isWinningEnding": false,
                "options": [{
                    "text": "go",
                    "nextNode": {"content": "end", "isEnding": true, "isWinningEnding": true, "options": []}
                }]
            })),
        };

        let a = typed.normalize("any").unwrap();
        let b = raw.normalize("any").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.root.count(), 2);
        assert_eq!(a.root.options[0].text, "go");
        assert!(a.root.options[0].next.is_winning_ending);
    }

    #[test]
    fn test_mixed_shapes_within_one_tree() {
        let response = StoryLlmResponse {
            title: None,
            root_node: NodeInput::Typed(StoryNodeLlm {
                content: "start".into(),
                is_ending: false,
                is_winning_ending: false,
                options: vec![
                    OptionInput::Raw(json!({"text": "left", "nextNode": {"content": "l", "isEnding": true}})),
                    OptionInput::Typed(StoryOptionLlm {
                        text: Some("right".into()),
                        next_node: Box::new(NodeInput::Raw(
                            json!({"content": "r", "isEnding": "true", "isWinningEnding": "TRUE"}),
                        )),
                    }),
                ],
            }),
        };

        let draft = response.normalize("caves").unwrap();
        assert_eq!(draft.title, "Adventure: caves");
        assert_eq!(draft.root.options.len(), 2);
        assert!(!draft.root.options[0].next.is_winning_ending);
        assert!(draft.root.options[1].next.is_winning_ending);
    }

    #[test]
    fn test_missing_label_defaults_to_continue() {
        let response: StoryLlmResponse = serde_json::from_value(json!({
            "title": "T",
            "rootNode": {
                "content": "c",
                "options": [
                    {"nextNode": {"content": "a", "isEnding": true}},
                    {"text": null, "nextNode": {"content": "b", "isEnding": true}},
                    {"text": "  ", "nextNode": {"content": "c", "isEnding": true}}
                ]
            }
        }))
        .unwrap();

        let draft = response.normalize("t").unwrap();
        for option in &draft.root.options {
            assert_eq!(option.text, DEFAULT_OPTION_TEXT);
        }
    }

    #[test]
    fn test_deserialized_document_prefers_typed_nodes() {
        let response: StoryLlmResponse = serde_json::from_value(json!({
            "title": "T",
            "rootNode": {"content": "c", "isEnding": true, "isWinningEnding": false, "options": []}
        }))
        .unwrap();
        assert!(matches!(response.root_node, NodeInput::Typed(_)));

        let loose: StoryLlmResponse = serde_json::from_value(json!({
            "title": "T",
            "rootNode": {"content": "c", "isEnding": "true"}
        }))
        .unwrap();
        assert!(matches!(loose.root_node, NodeInput::Raw(_)));
        assert!(loose.normalize("t").unwrap().root.is_ending);
    }

    #[test]
    fn test_ending_with_options_is_rejected() {
        let response = StoryLlmResponse {
            title: None,
            root_node: NodeInput::Raw(json!({
                "content": "c",
                "isEnding": true,
                "options": [{"text": "x", "nextNode": {"content": "d", "isEnding": true}}]
            })),
        };
        assert!(matches!(
            response.normalize("t"),
            Err(StoryError::Malformed(msg)) if msg.contains("rootNode is an ending")
        ));
    }

    #[test]
    fn test_choice_without_options_is_rejected() {
        let response = StoryLlmResponse {
            title: None,
            root_node: NodeInput::Raw(json!({"content": "c", "isEnding": false, "options": []})),
        };
        assert!(matches!(
            response.normalize("t"),
            Err(StoryError::Malformed(_))
        ));
    }

    #[test]
    fn test_winning_choice_is_rejected() {
        let response = StoryLlmResponse {
            title: None,
            root_node: NodeInput::Raw(json!({"content": "c", "isWinningEnding": true})),
        };
        assert!(response.normalize("t").is_err());
    }

    #[test]
    fn test_errors_name_the_offending_path() {
        let response = StoryLlmResponse {
            title: None,
            root_node: NodeInput::Raw(json!({
                "content": "c",
                "options": [
                    {"text": "ok", "nextNode": {"content": "fine", "isEnding": true}},
                    {"text": "bad", "nextNode": 7}
                ]
            })),
        };
        match response.normalize("t") {
            Err(StoryError::Malformed(msg)) => {
                assert!(msg.starts_with("rootNode.options[1].nextNode"), "{msg}")
            }
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn test_option_without_next_node_is_rejected() {
        let response = StoryLlmResponse {
            title: None,
            root_node: NodeInput::Raw(json!({"content": "c", "options": [{"text": "dead end"}]})),
        };
        assert!(matches!(
            response.normalize("t"),
            Err(StoryError::Malformed(msg)) if msg.contains("no nextNode")
        ));
    }
}
