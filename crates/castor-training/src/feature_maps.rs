//! Feature maps: per-layer activation images for one input image.
//!
//! The scoring service writes one column per (layer, image) pair, named
//! `_LayerAct_{layer}_IMG_{index}_`. The structure of a result is the number of
//! images each layer produced, recovered from those column names alone.

use crate::artifacts::ArtifactKind;
use crate::error::{ModelError, ModelResult};
use crate::session::ModelSession;
use crate::table_ref::TableRef;
use castor_abstraction::{
    Augmentation, Image, ImageService, LayerImageType, LayerOutput, ScoreRequest, TableDescriptor,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const LAYER_ACTIVATION_PREFIX: &str = "_LayerAct_";

/// Panels per row before the grid switches to a square layout.
const MAX_GRID_COLUMNS: u32 = 8;
const SQUARE_GRID_THRESHOLD: u32 = 64;
const FIGURE_WIDTH: u32 = 16;

static ACTIVATION_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^_LayerAct_(\d+)_IMG_(\d+)_$").expect("valid layer activation pattern")
});

/// Layer id → number of activation images.
pub type FeatureMapStructure = BTreeMap<u32, u32>;

#[must_use]
pub fn activation_column(layer: u32, index: u32) -> String {
    format!("{LAYER_ACTIVATION_PREFIX}{layer}_IMG_{index}_")
}

/// `(layer, image index)` of an activation column, or `None` for any other column.
#[must_use]
pub fn parse_activation_column(column: &str) -> Option<(u32, u32)> {
    let caps = ACTIVATION_COLUMN.captures(column)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Image count per layer is one past the highest index seen, so gaps in the
/// numbering do not shrink a layer.
pub fn decode_structure<I, S>(columns: I) -> FeatureMapStructure
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut structure = FeatureMapStructure::new();
    for (layer, index) in columns.into_iter().filter_map(|c| parse_activation_column(c.as_ref())) {
        let count = structure.entry(layer).or_insert(0);
        *count = (*count).max(index.saturating_add(1));
    }
    structure
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    pub columns: u32,
    pub rows: u32,
}

impl GridLayout {
    /// Up to 8 panels per row for small layers, a square-ish grid above 64 images.
    #[must_use]
    pub fn for_images(count: u32) -> Self {
        if count == 0 {
            return Self { columns: 0, rows: 0 };
        }
        let columns = if count > SQUARE_GRID_THRESHOLD {
            f64::from(count).sqrt().ceil() as u32
        } else {
            count.min(MAX_GRID_COLUMNS)
        };
        Self { columns, rows: count.div_ceil(columns) }
    }

    /// Zero-based `(row, column)` of panel `index`, filling rows first.
    #[must_use]
    pub fn cell(&self, index: u32) -> (u32, u32) {
        (index / self.columns, index % self.columns)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMapPanel {
    pub index: u32,
    pub row: u32,
    pub column: u32,
    /// Activation column the image came from.
    pub source: String,
    /// Single-channel pixels.
    pub image: Image,
}

/// Everything needed to draw one layer's feature maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMapFigure {
    pub title: String,
    pub layout: GridLayout,
    /// Figure size in inches, width by height.
    pub size: (u32, u32),
    pub show_ticks: bool,
    pub panels: Vec<FeatureMapPanel>,
}

/// The activation table of one extraction and its decoded structure.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMaps {
    table: TableDescriptor,
    structure: FeatureMapStructure,
}

impl FeatureMaps {
    #[must_use]
    pub fn new(table: TableDescriptor, structure: FeatureMapStructure) -> Self {
        Self { table, structure }
    }

    #[must_use]
    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    #[must_use]
    pub fn structure(&self) -> &FeatureMapStructure {
        &self.structure
    }

    #[must_use]
    pub fn layers(&self) -> Vec<u32> {
        self.structure.keys().copied().collect()
    }

    #[must_use]
    pub fn image_count(&self, layer: u32) -> Option<u32> {
        self.structure.get(&layer).copied()
    }

    /// Fetch every activation image of `layer` and lay them out on a grid.
    pub async fn display(
        &self,
        images: &dyn ImageService,
        layer: u32,
    ) -> ModelResult<FeatureMapFigure> {
        let count = self.image_count(layer).ok_or(ModelError::UnknownLayer(layer))?;
        let layout = GridLayout::for_images(count);

        let mut panels = Vec::with_capacity(count as usize);
        for index in 0..count {
            let source = activation_column(layer, index);
            let image = images
                .fetch_image(&self.table, &source)
                .await
                .map_err(|e| {
                    ModelError::remote("fetch image", ArtifactKind::FeatureMaps, &source, e)
                })?;
            let (row, column) = layout.cell(index);
            panels.push(FeatureMapPanel {
                index,
                row,
                column,
                source,
                image: to_grayscale(&image),
            });
        }

        let height = (FIGURE_WIDTH / layout.columns.max(1)).max(1) * layout.rows;
        Ok(FeatureMapFigure {
            title: format!("{LAYER_ACTIVATION_PREFIX}{layer}"),
            layout,
            size: (FIGURE_WIDTH, height),
            show_ticks: false,
            panels,
        })
    }
}

/// Luma (ITU-R BT.601) of RGB(A) images; single- and two-channel images keep
/// their first channel.
#[must_use]
pub fn to_grayscale(image: &Image) -> Image {
    let channels = usize::from(image.channels.max(1));
    let pixels = if channels == 1 {
        image.pixels.clone()
    } else {
        image
            .pixels
            .chunks_exact(channels)
            .map(|px| {
                if channels >= 3 {
                    let luma =
                        299 * u32::from(px[0]) + 587 * u32::from(px[1]) + 114 * u32::from(px[2]);
                    (luma / 1000) as u8
                } else {
                    px[0]
                }
            })
            .collect()
    };
    Image { width: image.width, height: image.height, channels: 1, pixels }
}

impl ModelSession {
    /// Score `data` in layer-image mode and decode the activation table for `image_id`.
    ///
    /// Replaces any feature maps extracted earlier.
    pub async fn extract_feature_maps(
        &mut self,
        data: impl Into<TableRef>,
        image_id: u32,
        extra: Map<String, Value>,
    ) -> ModelResult<&FeatureMaps> {
        let table = data.into().normalize()?;
        let destination = format!("{}_{image_id}", self.names.generate("Feature_Maps"));
        let mut layer_table = TableDescriptor::named(&destination);
        layer_table.options.insert("replace".to_string(), Value::Bool(true));

        let request = ScoreRequest {
            model: self.name.clone(),
            init_weights: self.weights_table(),
            table: table.clone(),
            copy_columns: Vec::new(),
            augmentation: Augmentation::none(),
            casout: None,
            layer_output: Some(LayerOutput {
                destination: layer_table,
                image_type: LayerImageType::Image,
                layers: Vec::new(),
            }),
            extra,
        };

        debug!(
            model = %self.name,
            data = %table.name,
            destination = %destination,
            "Extracting feature maps"
        );
        self.services
            .scoring
            .score(request)
            .await
            .map_err(|e| ModelError::remote("score", ArtifactKind::ScoringData, &table.name, e))?;

        let result = TableDescriptor::named(&destination);
        let columns = self
            .services
            .tables
            .column_names(&result)
            .await
            .map_err(|e| {
                ModelError::remote("column info", ArtifactKind::FeatureMaps, &destination, e)
            })?;
        let structure = decode_structure(&columns);
        debug!(
            destination = %destination,
            layers = structure.len(),
            "Feature map structure decoded"
        );

        Ok(self.feature_maps.insert(FeatureMaps::new(result, structure)))
    }

    /// Lay out the last extracted feature maps of `layer`.
    pub async fn display_feature_maps(&self, layer: u32) -> ModelResult<FeatureMapFigure> {
        let maps = self.feature_maps.as_ref().ok_or(ModelError::NoFeatureMaps)?;
        maps.display(self.services.images.as_ref(), layer).await
    }
}
