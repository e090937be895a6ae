//! Typed node configuration variants and their value types
//!
//! Configs are value objects: replacing a node's config always yields a fresh
//! node version. The sum type is internally tagged with the node type name,
//! so a serialized config is self-describing:
//!
//! ```json
//! { "type": "blur", "radius": 2 }
//! { "type": "resize", "width": 640, "interpolation": "lanczos3" }
//! { "type": "palette_edit", "colors": ["#FF0000", "!#00FF00"] }
//! ```

use crate::error::GraphError;
use crate::node_type::NodeType;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Interpolation kernel for the resize family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    NearestNeighbor,
    Bilinear,
    Bicubic,
    MitchellNetravali,
    Lanczos2,
    Lanczos3,
}

/// Palette extraction method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaletteMethod {
    /// k-means clustering in the Oklab perceptual color space
    OklabClusters,
    /// Most frequent quantized colors
    DominantFrequency,
}

/// Channel normalization applied before palette mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMode {
    Lightness,
}

/// An sRGB color in `#RRGGBB` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HexColor {
    pub const BLACK: HexColor = HexColor { r: 0, g: 0, b: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse the `#RRGGBB` textual form
    pub fn parse(s: &str) -> Result<Self, GraphError> {
        let malformed = || GraphError::InvalidColor(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(malformed)?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed());
        }
        Ok(Self {
            r: u8::from_str_radix(&hex[0..2], 16).map_err(|_| malformed())?,
            g: u8::from_str_radix(&hex[2..4], 16).map_err(|_| malformed())?,
            b: u8::from_str_radix(&hex[4..6], 16).map_err(|_| malformed())?,
        })
    }

    pub fn channels(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for HexColor {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for HexColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HexColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        HexColor::parse(&text).map_err(D::Error::custom)
    }
}

/// One entry of an editable palette
///
/// The textual form is the hex color, with a `!` prefix when the entry is
/// disabled: `"!#00FF00"`. Disabled entries are kept in the config (so the
/// client can re-enable them) but skipped when the palette image is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteEntry {
    pub color: HexColor,
    pub disabled: bool,
}

impl PaletteEntry {
    pub fn enabled(color: HexColor) -> Self {
        Self {
            color,
            disabled: false,
        }
    }

    /// Parse the `[!]#RRGGBB` textual form
    pub fn parse(s: &str) -> Result<Self, GraphError> {
        match s.strip_prefix('!') {
            Some(rest) => Ok(Self {
                color: HexColor::parse(rest)?,
                disabled: true,
            }),
            None => Ok(Self {
                color: HexColor::parse(s)?,
                disabled: false,
            }),
        }
    }
}

impl fmt::Display for PaletteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.disabled {
            write!(f, "!{}", self.color)
        } else {
            write!(f, "{}", self.color)
        }
    }
}

impl Serialize for PaletteEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PaletteEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        PaletteEntry::parse(&text).map_err(D::Error::custom)
    }
}

/// Parse the comma-separated palette-edit spec, e.g. `"#FF0000,!#00FF00"`
///
/// An empty string yields an empty palette.
pub fn parse_palette_spec(spec: &str) -> Result<Vec<PaletteEntry>, GraphError> {
    if spec.trim().is_empty() {
        return Ok(Vec::new());
    }
    spec.split(',')
        .map(|part| PaletteEntry::parse(part.trim()))
        .collect()
}

/// Field serde for palette-edit colors: serialized as a list of entry
/// strings, deserialized from either that list or the compact
/// comma-separated spec form
mod palette_entries {
    use super::{parse_palette_spec, PaletteEntry};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        entries: &[PaletteEntry],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(entries)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<PaletteEntry>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Spec(String),
            List(Vec<PaletteEntry>),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Spec(spec) => parse_palette_spec(&spec).map_err(D::Error::custom),
            Repr::List(list) => Ok(list),
        }
    }
}

/// Typed node configuration, one variant per [`NodeType`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    Input,
    Blur {
        radius: u32,
    },
    Crop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        left: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        top: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bottom: Option<u32>,
    },
    Resize {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
        interpolation: Interpolation,
    },
    ResizeMatch {
        interpolation: Interpolation,
    },
    PixelInflate {
        width: u32,
        line_width: u32,
        line_color: HexColor,
    },
    PaletteExtract {
        num_colors: u32,
        method: PaletteMethod,
    },
    PaletteApply {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        normalize: Option<NormalizeMode>,
    },
    PaletteCreate {
        colors: Vec<HexColor>,
    },
    PaletteEdit {
        #[serde(with = "palette_entries")]
        colors: Vec<PaletteEntry>,
    },
    Output,
}

impl NodeConfig {
    /// The node type this variant belongs to
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeConfig::Input => NodeType::Input,
            NodeConfig::Blur { .. } => NodeType::Blur,
            NodeConfig::Crop { .. } => NodeType::Crop,
            NodeConfig::Resize { .. } => NodeType::Resize,
            NodeConfig::ResizeMatch { .. } => NodeType::ResizeMatch,
            NodeConfig::PixelInflate { .. } => NodeType::PixelInflate,
            NodeConfig::PaletteExtract { .. } => NodeType::PaletteExtract,
            NodeConfig::PaletteApply { .. } => NodeType::PaletteApply,
            NodeConfig::PaletteCreate { .. } => NodeType::PaletteCreate,
            NodeConfig::PaletteEdit { .. } => NodeType::PaletteEdit,
            NodeConfig::Output => NodeType::Output,
        }
    }

    /// Whether this variant agrees with the given node type
    pub fn matches(&self, node_type: NodeType) -> bool {
        self.node_type() == node_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_color_parse() {
        let color = HexColor::parse("#1A2b3C").unwrap();
        assert_eq!(color, HexColor::rgb(0x1A, 0x2B, 0x3C));
        assert_eq!(color.to_string(), "#1A2B3C");
    }

    #[test]
    fn test_hex_color_rejects_malformed() {
        for bad in ["1A2B3C", "#1A2B3", "#1A2B3CDD", "#GG0000", "", "#"] {
            assert!(
                matches!(HexColor::parse(bad), Err(GraphError::InvalidColor(_))),
                "expected rejection of {bad:?}"
            );
        }
    }

    #[test]
    fn test_palette_entry_disabled_prefix() {
        let entry = PaletteEntry::parse("!#00FF00").unwrap();
        assert!(entry.disabled);
        assert_eq!(entry.color, HexColor::rgb(0, 0xFF, 0));
        assert_eq!(entry.to_string(), "!#00FF00");
    }

    #[test]
    fn test_palette_spec_round_trip() {
        let entries = parse_palette_spec("#FF0000, !#00FF00,#0000FF").unwrap();
        assert_eq!(entries.len(), 3);
        assert!(!entries[0].disabled);
        assert!(entries[1].disabled);
        assert!(parse_palette_spec("").unwrap().is_empty());
        assert!(parse_palette_spec("#FF0000,oops").is_err());
    }

    #[test]
    fn test_config_tagged_serialization() {
        let config = NodeConfig::Blur { radius: 2 };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json, serde_json::json!({"type": "blur", "radius": 2}));

        let config = NodeConfig::Resize {
            width: Some(640),
            height: None,
            interpolation: Interpolation::Lanczos3,
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "resize", "width": 640, "interpolation": "lanczos3"})
        );

        let back: NodeConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_config_type_agreement() {
        assert!(NodeConfig::Blur { radius: 1 }.matches(NodeType::Blur));
        assert!(!NodeConfig::Blur { radius: 1 }.matches(NodeType::Crop));
        assert!(NodeConfig::Output.matches(NodeType::Output));
    }

    #[test]
    fn test_palette_edit_accepts_comma_separated_spec() {
        let config: NodeConfig = serde_json::from_value(serde_json::json!({
            "type": "palette_edit",
            "colors": "#FF0000, !#00FF00",
        }))
        .unwrap();
        let NodeConfig::PaletteEdit { colors } = config else {
            panic!("wrong variant");
        };
        assert_eq!(colors.len(), 2);
        assert!(colors[1].disabled);
    }

    #[test]
    fn test_palette_edit_serializes_entries_as_strings() {
        let config = NodeConfig::PaletteEdit {
            colors: vec![
                PaletteEntry::enabled(HexColor::rgb(0xFF, 0, 0)),
                PaletteEntry {
                    color: HexColor::rgb(0, 0xFF, 0),
                    disabled: true,
                },
            ],
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "palette_edit", "colors": ["#FF0000", "!#00FF00"]})
        );
    }
}
