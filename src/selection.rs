//! Selection state and the controller that keeps layer styles in sync with it.

use crate::breaks::BreaksTable;
use crate::config::MapConfig;
use crate::error::{Result, StyleError};
use crate::legend::Legend;
use crate::models::Dataset;
use crate::paint::{self, PaintStyle};
use ahash::AHashMap;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What the user is looking at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    pub indicator: String,
    pub aggregation: String,
    /// Requested per-capita basis; ignored while the indicator or level does not allow it.
    pub per_capita: Option<String>,
    pub bound_level: Option<String>,
    pub date_index: usize,
}

impl SelectionState {
    /// Configured defaults, falling back to the first entry of each table.
    pub fn initial(config: &MapConfig, today: NaiveDate) -> Result<Self> {
        let indicator = match &config.defaults.indicator {
            Some(id) => id.clone(),
            None => config
                .indicators
                .first()
                .map(|i| i.id.clone())
                .ok_or_else(|| StyleError::UnknownIndicator(String::new()))?,
        };
        let aggregation = match &config.defaults.aggregation {
            Some(id) => id.clone(),
            None => config
                .aggregations
                .first()
                .map(|a| a.id.clone())
                .ok_or_else(|| StyleError::UnknownAggregation(String::new()))?,
        };
        let bound_level = config
            .defaults
            .bound_level
            .clone()
            .or_else(|| config.bound_levels.first().map(|b| b.id.clone()));
        Ok(Self {
            indicator,
            aggregation,
            per_capita: config.defaults.per_capita.clone(),
            bound_level,
            date_index: config.default_date_index(today),
        })
    }

    /// Check every id against `config`.
    pub fn validate(&self, config: &MapConfig) -> Result<()> {
        config.indicator(&self.indicator)?;
        config.aggregation(&self.aggregation)?;
        if let Some(id) = &self.per_capita {
            config.per_capita_basis(id)?;
        }
        if let Some(id) = &self.bound_level {
            config.bound_level(id)?;
        }
        if config.key_scheme.uses_date() {
            config.date(self.date_index)?;
        }
        Ok(())
    }

    pub fn apply(&self, update: &SelectionUpdate) -> Self {
        let mut next = self.clone();
        if let Some(v) = &update.indicator {
            next.indicator = v.clone();
        }
        if let Some(v) = &update.aggregation {
            next.aggregation = v.clone();
        }
        if let Some(v) = &update.per_capita {
            next.per_capita = v.clone();
        }
        if let Some(v) = &update.bound_level {
            next.bound_level = Some(v.clone());
        }
        if let Some(v) = update.date_index {
            next.date_index = v;
        }
        next
    }
}

/// A partial change to the selection; `None` fields are left as they are.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionUpdate {
    pub indicator: Option<String>,
    pub aggregation: Option<String>,
    /// `Some(None)` switches back to totals.
    pub per_capita: Option<Option<String>>,
    pub bound_level: Option<String>,
    pub date_index: Option<usize>,
}

impl SelectionUpdate {
    pub fn indicator(id: impl Into<String>) -> Self {
        Self {
            indicator: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn aggregation(id: impl Into<String>) -> Self {
        Self {
            aggregation: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn per_capita(id: Option<&str>) -> Self {
        Self {
            per_capita: Some(id.map(str::to_string)),
            ..Self::default()
        }
    }

    pub fn date_index(index: usize) -> Self {
        Self {
            date_index: Some(index),
            ..Self::default()
        }
    }
}

/// Handle for one in-flight load of a layer's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    layer: String,
    seq: u64,
}

impl LoadTicket {
    pub fn layer(&self) -> &str {
        &self.layer
    }
}

/// Owns the selection and everything derived from it.
#[derive(Debug)]
pub struct Controller {
    config: MapConfig,
    selection: SelectionState,
    datasets: AHashMap<String, Dataset>,
    precomputed: AHashMap<String, BreaksTable>,
    breaks_cache: AHashMap<String, Vec<f64>>,
    styles: AHashMap<String, PaintStyle>,
    pending: AHashMap<String, u64>,
    next_seq: u64,
}

impl Controller {
    pub fn new(config: MapConfig, selection: SelectionState) -> Result<Self> {
        selection.validate(&config)?;
        let mut ctl = Self {
            config,
            selection,
            datasets: AHashMap::new(),
            precomputed: AHashMap::new(),
            breaks_cache: AHashMap::new(),
            styles: AHashMap::new(),
            pending: AHashMap::new(),
            next_seq: 0,
        };
        let layers: Vec<String> = ctl.config.aggregations.iter().map(|a| a.id.clone()).collect();
        for layer in &layers {
            ctl.recompute(layer)?;
        }
        Ok(ctl)
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Whether the per-capita toggle has any effect for the current selection.
    pub fn per_capita_enabled(&self) -> bool {
        match (
            self.config.indicator(&self.selection.indicator),
            self.config.aggregation(&self.selection.aggregation),
        ) {
            (Ok(i), Ok(a)) => self.config.allows_per_capita(i, a) && !self.config.per_capita.is_empty(),
            _ => false,
        }
    }

    /// Apply a partial selection change and restyle the affected layers.
    ///
    /// Returns the ids of the layers that were recomputed. An invalid update leaves
    /// the controller untouched.
    pub fn update(&mut self, update: SelectionUpdate) -> Result<Vec<String>> {
        let next = self.selection.apply(&update);
        next.validate(&self.config)?;
        if next == self.selection {
            return Ok(Vec::new());
        }

        let mut affected = vec![next.aggregation.clone()];
        if next.aggregation != self.selection.aggregation {
            affected.push(self.selection.aggregation.clone());
        }
        let previous = std::mem::replace(&mut self.selection, next);
        for layer in &affected {
            if let Err(e) = self.recompute(layer) {
                self.selection = previous;
                return Err(e);
            }
        }
        log::debug!("selection changed; restyled {:?}", affected);
        Ok(affected)
    }

    /// Install data for a layer, dropping any breaks cached from older data.
    pub fn load_layer(&mut self, layer: &str, dataset: Dataset) -> Result<()> {
        self.config.aggregation(layer)?;
        log::info!("loaded {} features for layer '{}'", dataset.len(), layer);
        self.datasets.insert(layer.to_string(), dataset);
        self.invalidate(layer);
        self.recompute(layer)
    }

    /// Install precomputed breaks for a layer (overrides breaks from the config).
    pub fn load_breaks(&mut self, layer: &str, table: BreaksTable) -> Result<()> {
        self.config.aggregation(layer)?;
        self.precomputed.insert(layer.to_string(), table);
        self.invalidate(layer);
        self.recompute(layer)
    }

    /// Start a load for `layer`. Only the newest ticket per layer will be accepted.
    pub fn begin_load(&mut self, layer: &str) -> LoadTicket {
        self.next_seq += 1;
        self.pending.insert(layer.to_string(), self.next_seq);
        LoadTicket {
            layer: layer.to_string(),
            seq: self.next_seq,
        }
    }

    /// Complete a load. Returns `false` and drops the data when a newer load for the
    /// same layer was started in the meantime.
    pub fn finish_load(&mut self, ticket: LoadTicket, dataset: Dataset) -> Result<bool> {
        if self.pending.get(&ticket.layer) != Some(&ticket.seq) {
            log::warn!("discarding stale data for layer '{}'", ticket.layer);
            return Ok(false);
        }
        self.pending.remove(&ticket.layer);
        self.load_layer(&ticket.layer, dataset)?;
        Ok(true)
    }

    pub fn dataset(&self, layer: &str) -> Option<&Dataset> {
        self.datasets.get(layer)
    }

    pub fn style(&self, layer: &str) -> Option<&PaintStyle> {
        self.styles.get(layer)
    }

    /// Styles of all layers, in configuration order.
    pub fn styles(&self) -> Vec<(&str, &PaintStyle)> {
        self.config
            .aggregations
            .iter()
            .filter_map(|a| self.styles.get(&a.id).map(|s| (a.id.as_str(), s)))
            .collect()
    }

    /// Legend of the active layer, when it is visible.
    pub fn legend(&self) -> Option<Legend> {
        let style = self.styles.get(&self.selection.aggregation)?.resolved()?;
        Some(Legend::from_style(style, self.config.fallback()))
    }

    fn invalidate(&mut self, layer: &str) {
        let prefix = format!("{}|", layer);
        self.breaks_cache.retain(|k, _| !k.starts_with(&prefix));
    }

    fn recompute(&mut self, layer: &str) -> Result<()> {
        let aggregation = self.config.aggregation(layer)?;
        let style = match paint::plan(&self.config, &self.selection, layer)? {
            None => PaintStyle::hidden(aggregation.kind),
            Some(plan) => {
                let key = plan.cache_key();
                let breaks = match self.breaks_cache.get(&key) {
                    Some(b) => {
                        log::debug!("breaks cache hit for {}", key);
                        Ok(b.clone())
                    }
                    None => {
                        let features = self
                            .datasets
                            .get(layer)
                            .map(|d| d.features.as_slice())
                            .unwrap_or(&[]);
                        let table = self.precomputed.get(layer).or(aggregation.breaks.as_ref());
                        let resolved = paint::resolve_breaks(&plan, features, table);
                        if let Ok(b) = &resolved {
                            self.breaks_cache.insert(key, b.clone());
                        }
                        resolved
                    }
                };
                paint::finish(plan, breaks)?
            }
        };
        self.styles.insert(layer.to_string(), style);
        Ok(())
    }
}
