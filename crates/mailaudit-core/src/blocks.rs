//! Content blocks that make up an audit report page.

use serde::{Deserialize, Serialize};

/// A single display block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Top-level heading
    Heading1 {
        /// Heading text
        text: String,
    },
    /// Second-level heading
    Heading2 {
        /// Heading text
        text: String,
    },
    /// Paragraph
    Paragraph {
        /// Paragraph text
        text: String,
    },
    /// Bulleted list item
    Bullet {
        /// Item text
        text: String,
    },
    /// Horizontal divider
    Divider,
    /// Image referencing an uploaded file
    Image {
        /// Uploaded file
        file: FileHandle,
        /// Caption under the image
        caption: String,
    },
}

impl Block {
    /// Heading 1 block.
    pub fn h1(text: impl Into<String>) -> Self {
        Self::Heading1 { text: text.into() }
    }

    /// Heading 2 block.
    pub fn h2(text: impl Into<String>) -> Self {
        Self::Heading2 { text: text.into() }
    }

    /// Paragraph block.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph { text: text.into() }
    }

    /// Bullet block.
    pub fn bullet(text: impl Into<String>) -> Self {
        Self::Bullet { text: text.into() }
    }

    /// Text carried by the block, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Heading1 { text }
            | Self::Heading2 { text }
            | Self::Paragraph { text }
            | Self::Bullet { text } => Some(text),
            Self::Image { caption, .. } => Some(caption),
            Self::Divider => None,
        }
    }
}

/// Reference to a file uploaded to the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHandle {
    /// Store-assigned upload id
    pub id: String,
    /// Original file name
    pub filename: String,
}
