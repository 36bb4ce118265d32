use serde::{Deserialize, Serialize};

pub const WHITE: [u8; 4] = [255, 255, 255, 255];
pub const RED: [u8; 4] = [255, 89, 89, 255];

/// What a block shows while it is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockContent {
    Text {
        text: String,
        color: [u8; 4],
    },
    /// Full-screen checkerboard, phase-reversed every flicker period.
    /// `checker_size` is a fraction of the screen height.
    Checkerboard { checker_size: f32, color: [u8; 4] },
}

impl BlockContent {
    pub fn text(text: impl Into<String>, color: [u8; 4]) -> Self {
        BlockContent::Text {
            text: text.into(),
            color,
        }
    }

    pub fn checkerboard() -> Self {
        BlockContent::Checkerboard {
            checker_size: 0.1,
            color: WHITE,
        }
    }

    /// Flickering content must be redrawn on a clock, not just on transitions.
    pub fn flickers(&self) -> bool {
        matches!(self, BlockContent::Checkerboard { .. })
    }
}

/// One entry of the block order: the label written to the event log and
/// the content drawn while the block runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    pub label: String,
    pub content: BlockContent,
}

impl BlockSpec {
    pub fn new(label: impl Into<String>, content: BlockContent) -> Self {
        Self {
            label: label.into(),
            content,
        }
    }

    /// A block that shows its own label as text.
    pub fn text(label: impl Into<String>, color: [u8; 4]) -> Self {
        let label = label.into();
        Self {
            content: BlockContent::text(label.clone(), color),
            label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_checkerboards_flicker() {
        assert!(BlockContent::checkerboard().flickers());
        assert!(!BlockContent::text("Relax", WHITE).flickers());
    }

    #[test]
    fn content_deserializes_from_tagged_table() {
        let json = r#"{"label":"Grid","content":{"kind":"checkerboard","checker_size":0.2,"color":[255,255,255,255]}}"#;
        let spec: BlockSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.label, "Grid");
        assert!(spec.content.flickers());
    }
}
