//! Plugin descriptor: declared inputs and output grid plus the
//! `transform`/`summarise` callbacks a drill runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{DrillError, Result};
use crate::raster::{RasterCube, ZoneValues};
use crate::table::Record;
use crate::types::{Crs, Resampling, Resolution};

/// Failure raised from inside a plugin callback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginError {
    #[error("missing band: {0}")]
    MissingBand(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("{0}")]
    Other(String),
}

impl From<PluginError> for DrillError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::MissingBand(m) => DrillError::MissingBand(m),
            PluginError::TypeMismatch(m) => DrillError::TypeMismatch(m),
            PluginError::Other(m) => DrillError::Plugin(m),
        }
    }
}

/// Per-call context handed to plugin callbacks.
#[derive(Debug)]
pub struct PluginContext {
    resolution: Resolution,
    warnings: Vec<String>,
}

impl PluginContext {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            warnings: Vec::new(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Record a warning. Any warning fails the drill.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Turn collected warnings into an error, if there are any.
    pub fn into_result(self) -> Result<()> {
        if self.warnings.is_empty() {
            Ok(())
        } else {
            Err(DrillError::PluginWarning(self.warnings.join("; ")))
        }
    }
}

pub type TransformFn =
    Arc<dyn Fn(RasterCube, &mut PluginContext) -> std::result::Result<RasterCube, PluginError> + Send + Sync>;

pub type SummariseFn =
    Arc<dyn Fn(&ZoneValues, &mut PluginContext) -> std::result::Result<Record, PluginError> + Send + Sync>;

/// A validated plugin. Build one with [`Plugin::builder`].
#[derive(Clone)]
pub struct Plugin {
    product_name: String,
    version: String,
    input_products: BTreeMap<String, Vec<String>>,
    output_crs: Crs,
    resolution: Resolution,
    resampling: Resampling,
    transform: TransformFn,
    summarise: SummariseFn,
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("product_name", &self.product_name)
            .field("version", &self.version)
            .field("input_products", &self.input_products)
            .field("output_crs", &self.output_crs)
            .field("resolution", &self.resolution)
            .field("resampling", &self.resampling)
            .finish_non_exhaustive()
    }
}

impl Plugin {
    pub fn builder() -> PluginBuilder {
        PluginBuilder::default()
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn input_products(&self) -> &BTreeMap<String, Vec<String>> {
        &self.input_products
    }

    pub fn output_crs(&self) -> &Crs {
        &self.output_crs
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn resampling(&self) -> Resampling {
        self.resampling
    }

    /// The single `(product, band)` pair a drill can run on.
    pub fn single_input(&self) -> Result<(&str, &str)> {
        let mut products = self.input_products.iter();
        match (products.next(), products.next()) {
            (Some((product, bands)), None) if bands.len() == 1 => {
                Ok((product.as_str(), bands[0].as_str()))
            }
            _ => Err(DrillError::config(format!(
                "plugin '{}' must declare exactly one input product with one band, got {:?}",
                self.product_name, self.input_products
            ))),
        }
    }

    pub fn transform(&self, cube: RasterCube) -> Result<RasterCube> {
        let mut ctx = PluginContext::new(self.resolution);
        let out = (self.transform)(cube, &mut ctx)?;
        ctx.into_result()?;
        Ok(out)
    }

    pub(crate) fn summarise_with(
        &self,
        values: &ZoneValues,
        ctx: &mut PluginContext,
    ) -> std::result::Result<Record, PluginError> {
        (self.summarise)(values, ctx)
    }
}

/// Collects plugin members; `build` reports every missing one at once.
#[derive(Default)]
pub struct PluginBuilder {
    product_name: Option<String>,
    version: Option<String>,
    input_products: Option<BTreeMap<String, Vec<String>>>,
    output_crs: Option<Crs>,
    resolution: Option<Resolution>,
    resampling: Option<Resampling>,
    transform: Option<TransformFn>,
    summarise: Option<SummariseFn>,
}

impl PluginBuilder {
    pub fn product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn input_product<I, S>(mut self, product: impl Into<String>, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_products
            .get_or_insert_with(BTreeMap::new)
            .insert(product.into(), bands.into_iter().map(Into::into).collect());
        self
    }

    pub fn output_crs(mut self, crs: impl Into<Crs>) -> Self {
        self.output_crs = Some(crs.into());
        self
    }

    pub fn resolution(mut self, x: f64, y: f64) -> Self {
        self.resolution = Some(Resolution::new(x, y));
        self
    }

    pub fn resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = Some(resampling);
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(RasterCube, &mut PluginContext) -> std::result::Result<RasterCube, PluginError>
            + Send
            + Sync
            + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    pub fn summarise<F>(mut self, f: F) -> Self
    where
        F: Fn(&ZoneValues, &mut PluginContext) -> std::result::Result<Record, PluginError>
            + Send
            + Sync
            + 'static,
    {
        self.summarise = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<Plugin> {
        let mut missing = Vec::new();
        if self.product_name.as_deref().map_or(true, str::is_empty) {
            missing.push("product_name".to_string());
        }
        if self.version.is_none() {
            missing.push("version".to_string());
        }
        match &self.input_products {
            None => missing.push("input_products".to_string()),
            Some(products) if products.is_empty() => missing.push("input_products".to_string()),
            Some(products) => {
                for (product, bands) in products {
                    if bands.is_empty() {
                        missing.push(format!("input_products.{product}"));
                    }
                }
            }
        }
        if self.output_crs.is_none() {
            missing.push("output_crs".to_string());
        }
        if self.resolution.is_none() {
            missing.push("resolution".to_string());
        }
        if self.transform.is_none() {
            missing.push("transform".to_string());
        }
        if self.summarise.is_none() {
            missing.push("summarise".to_string());
        }

        match self {
            PluginBuilder {
                product_name: Some(product_name),
                version: Some(version),
                input_products: Some(input_products),
                output_crs: Some(output_crs),
                resolution: Some(resolution),
                resampling,
                transform: Some(transform),
                summarise: Some(summarise),
            } if missing.is_empty() => Ok(Plugin {
                product_name,
                version,
                input_products,
                output_crs,
                resolution,
                resampling: resampling.unwrap_or_default(),
                transform,
                summarise,
            }),
            _ => Err(DrillError::Validation { missing }),
        }
    }
}
