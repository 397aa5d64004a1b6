use serde::{Deserialize, Serialize};

use crate::core::geo::TileCoord;
use crate::{MapError, Result};

/// Trait representing anything that can produce tile URLs for a given coordinate.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested `coord`.
    fn url(&self, coord: TileCoord) -> String;
}

const PLACEHOLDERS: [&str; 6] = ["s", "z", "x", "y", "-y", "r"];

/// URL template in the usual slippy-map form, e.g.
/// `https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png`.
///
/// `{s}` picks a subdomain from the tile position, `{-y}` is the row counted
/// from the bottom of the world and `{r}` expands to `@2x` for retina tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSource {
    pub template: String,
    pub subdomains: Vec<String>,
    /// Count rows from the bottom (TMS) for `{y}`
    pub tms: bool,
    pub zoom_offset: i32,
    /// Request `max_zoom - z` instead of `z`
    pub zoom_reverse: bool,
    pub max_zoom: i32,
    pub retina: bool,
}

impl Default for TemplateSource {
    fn default() -> Self {
        Self {
            template: String::new(),
            subdomains: vec!["a".into(), "b".into(), "c".into()],
            tms: false,
            zoom_offset: 0,
            zoom_reverse: false,
            max_zoom: 18,
            retina: false,
        }
    }
}

impl TemplateSource {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let source = Self {
            template: template.into(),
            ..Default::default()
        };
        source.validate()?;
        Ok(source)
    }

    /// The default OpenStreetMap tile server
    pub fn openstreetmap() -> Self {
        Self {
            template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".into(),
            max_zoom: 19,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let source: Self = serde_json::from_str(json)?;
        source.validate()?;
        Ok(source)
    }

    pub fn with_subdomains<I, S>(mut self, subdomains: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self.validate()?;
        Ok(self)
    }

    pub fn with_tms(mut self, tms: bool) -> Self {
        self.tms = tms;
        self
    }

    pub fn with_zoom_offset(mut self, zoom_offset: i32) -> Self {
        self.zoom_offset = zoom_offset;
        self
    }

    pub fn with_zoom_reverse(mut self, max_zoom: i32) -> Self {
        self.zoom_reverse = true;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_retina(mut self, retina: bool) -> Self {
        self.retina = retina;
        self
    }

    /// Rejects unknown `{placeholders}`, unbalanced braces and `{s}` without
    /// subdomains
    pub fn validate(&self) -> Result<()> {
        if self.template.is_empty() {
            return Err(MapError::InvalidConfig("tile URL template is empty".into()));
        }

        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                MapError::InvalidConfig(format!("unclosed '{{' in template '{}'", self.template))
            })?;
            let name = &after[..close];
            if !PLACEHOLDERS.contains(&name) {
                return Err(MapError::InvalidConfig(format!(
                    "unknown placeholder '{{{name}}}' in template '{}'",
                    self.template
                )));
            }
            if name == "s" && self.subdomains.is_empty() {
                return Err(MapError::InvalidConfig(
                    "template uses {s} but no subdomains are configured".into(),
                ));
            }
            rest = &after[close + 1..];
        }
        Ok(())
    }

    fn url_zoom(&self, z: i32) -> i32 {
        let z = if self.zoom_reverse { self.max_zoom - z } else { z };
        z + self.zoom_offset
    }

    fn subdomain(&self, coord: &TileCoord) -> &str {
        if self.subdomains.is_empty() {
            return "";
        }
        let sum = (coord.x as i64 + coord.y as i64).unsigned_abs() as usize;
        let index = sum % self.subdomains.len();
        &self.subdomains[index]
    }
}

impl TileSource for TemplateSource {
    fn url(&self, coord: TileCoord) -> String {
        let inverted_y = if (0..31).contains(&coord.z) {
            (1i64 << coord.z) - 1 - coord.y as i64
        } else {
            coord.y as i64
        };
        let y = if self.tms { inverted_y } else { coord.y as i64 };

        self.template
            .replace("{s}", self.subdomain(&coord))
            .replace("{z}", &self.url_zoom(coord.z).to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{-y}", &inverted_y.to_string())
            .replace("{y}", &y.to_string())
            .replace("{r}", if self.retina { "@2x" } else { "" })
    }
}
