//! The closed set of node types and their port schemas
//!
//! Every node type has a fixed set of named input and output ports. The
//! schema is the single source of truth: the aggregate derives a node's port
//! maps from it on creation, and invariant checks compare against it. Adding
//! a node type is a compile-time-visible change - the generation dispatch
//! table and the config sum type both match exhaustively on this enum.

use crate::config::{Interpolation, NodeConfig, PaletteMethod};
use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Enumerated node type
///
/// The wire form is snake_case (`resize_match`, `pixel_inflate`, …), matching
/// both the serialized config tag and the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Input,
    Blur,
    Crop,
    Resize,
    ResizeMatch,
    PixelInflate,
    PaletteExtract,
    PaletteApply,
    PaletteCreate,
    PaletteEdit,
    Output,
}

impl NodeType {
    /// Names of the input ports this type carries, all required
    pub fn input_names(&self) -> &'static [&'static str] {
        match self {
            NodeType::Input => &[],
            NodeType::Blur => &["original"],
            NodeType::Crop => &["original"],
            NodeType::Resize => &["original"],
            NodeType::ResizeMatch => &["original", "size_match"],
            NodeType::PixelInflate => &["original"],
            NodeType::PaletteExtract => &["source"],
            NodeType::PaletteApply => &["source", "palette"],
            NodeType::PaletteCreate => &[],
            NodeType::PaletteEdit => &["source"],
            NodeType::Output => &["input"],
        }
    }

    /// Names of the output ports this type carries
    pub fn output_names(&self) -> &'static [&'static str] {
        match self {
            NodeType::Input => &["original"],
            NodeType::Blur => &["blurred"],
            NodeType::Crop => &["cropped"],
            NodeType::Resize => &["resized"],
            NodeType::ResizeMatch => &["resized"],
            NodeType::PixelInflate => &["inflated"],
            NodeType::PaletteExtract => &["palette"],
            NodeType::PaletteApply => &["mapped"],
            NodeType::PaletteCreate => &["palette"],
            NodeType::PaletteEdit => &["palette"],
            NodeType::Output => &["final"],
        }
    }

    /// Default config variant for a freshly created node of this type
    pub fn default_config(&self) -> NodeConfig {
        match self {
            NodeType::Input => NodeConfig::Input,
            NodeType::Blur => NodeConfig::Blur { radius: 1 },
            NodeType::Crop => NodeConfig::Crop {
                left: None,
                right: None,
                top: None,
                bottom: None,
            },
            NodeType::Resize => NodeConfig::Resize {
                width: None,
                height: None,
                interpolation: Interpolation::Bilinear,
            },
            NodeType::ResizeMatch => NodeConfig::ResizeMatch {
                interpolation: Interpolation::Bilinear,
            },
            NodeType::PixelInflate => NodeConfig::PixelInflate {
                width: 4,
                line_width: 1,
                line_color: crate::config::HexColor::BLACK,
            },
            NodeType::PaletteExtract => NodeConfig::PaletteExtract {
                num_colors: 8,
                method: PaletteMethod::OklabClusters,
            },
            NodeType::PaletteApply => NodeConfig::PaletteApply { normalize: None },
            NodeType::PaletteCreate => NodeConfig::PaletteCreate { colors: Vec::new() },
            NodeType::PaletteEdit => NodeConfig::PaletteEdit { colors: Vec::new() },
            NodeType::Output => NodeConfig::Output,
        }
    }

    /// Whether outputs of this type are produced by the generation layer
    ///
    /// `Input` nodes are the one exception: their output image arrives from
    /// outside (an upload), so the readiness rule never dispatches generation
    /// work for them.
    pub fn generates(&self) -> bool {
        !matches!(self, NodeType::Input)
    }

    /// Canonical snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Input => "input",
            NodeType::Blur => "blur",
            NodeType::Crop => "crop",
            NodeType::Resize => "resize",
            NodeType::ResizeMatch => "resize_match",
            NodeType::PixelInflate => "pixel_inflate",
            NodeType::PaletteExtract => "palette_extract",
            NodeType::PaletteApply => "palette_apply",
            NodeType::PaletteCreate => "palette_create",
            NodeType::PaletteEdit => "palette_edit",
            NodeType::Output => "output",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(NodeType::Input),
            "blur" => Ok(NodeType::Blur),
            "crop" => Ok(NodeType::Crop),
            "resize" => Ok(NodeType::Resize),
            "resize_match" => Ok(NodeType::ResizeMatch),
            "pixel_inflate" => Ok(NodeType::PixelInflate),
            "palette_extract" => Ok(NodeType::PaletteExtract),
            "palette_apply" => Ok(NodeType::PaletteApply),
            "palette_create" => Ok(NodeType::PaletteCreate),
            "palette_edit" => Ok(NodeType::PaletteEdit),
            "output" => Ok(NodeType::Output),
            other => Err(GraphError::UnknownNodeType(other.to_string())),
        }
    }
}

/// All node types, in schema order
pub const ALL_NODE_TYPES: [NodeType; 11] = [
    NodeType::Input,
    NodeType::Blur,
    NodeType::Crop,
    NodeType::Resize,
    NodeType::ResizeMatch,
    NodeType::PixelInflate,
    NodeType::PaletteExtract,
    NodeType::PaletteApply,
    NodeType::PaletteCreate,
    NodeType::PaletteEdit,
    NodeType::Output,
];
