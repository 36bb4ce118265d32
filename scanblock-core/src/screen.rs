use crate::block::BlockContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStyle {
    Waiting,
    Instruction,
    /// Drawn on a grey background so the end of the run is obvious.
    Finished,
}

/// Everything a presenter needs to draw one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Message {
        text: String,
        style: MessageStyle,
    },
    Block {
        label: String,
        content: BlockContent,
        flicker_phase: u64,
        annotation: Option<String>,
    },
}

impl Screen {
    pub fn message(text: impl Into<String>, style: MessageStyle) -> Self {
        Screen::Message {
            text: text.into(),
            style,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Screen::Block { label, .. } => Some(label),
            Screen::Message { .. } => None,
        }
    }
}
