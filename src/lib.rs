//! ccm_style
//!
//! Choropleth classification and paint styles for the healthcare-capacity maps
//! (state/HRR/county/facility capacity, IHME projections, ventilator supply).
//! Pairs with the `ccm` CLI; `data-update-pr` is the CI helper that opens the data
//! update pull request.
//!
//! ### Features
//! - Class breaks: quantile, Jenks natural breaks, equal interval
//! - Per-capita normalization, eager per feature or deferred in the paint expression
//! - Stepwise and continuous color lookups, zoom-tiered circle radii
//! - Mapbox GL paint expressions, recomputed on every selection change
//! - Legends, previews (SVG/PNG), CSV/JSON exports and summary statistics
//!
//! ### Example
//! ```no_run
//! use ccm_style::{Controller, DataClient, MapConfig, SelectionState, SelectionUpdate};
//!
//! let config = MapConfig::healthcare_capacity();
//! let selection = SelectionState::initial(&config, chrono::Local::now().date_naive())?;
//! let mut map = Controller::new(config, selection)?;
//!
//! let data = DataClient::dir("site");
//! map.load_breaks("county", data.fetch_breaks("data/config/ccm_county_breaks.json")?)?;
//! map.update(SelectionUpdate::aggregation("county"))?;
//! let paint = map.style("county").map(|s| s.to_expression());
//! println!("{}", serde_json::to_string_pretty(&paint)?);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod breaks;
pub mod color;
pub mod config;
pub mod error;
pub mod fetch;
pub mod github;
pub mod key;
pub mod legend;
pub mod models;
pub mod normalize;
pub mod paint;
pub mod selection;
pub mod stats;
pub mod storage;
pub mod style;
pub mod viz;

pub use breaks::{BreaksTable, Method, compute_breaks, separate_equal_breaks};
pub use color::{ColorRamp, Rgb8};
pub use config::{LayerKind, MapConfig, RuntimeConfig};
pub use error::StyleError;
pub use fetch::DataClient;
pub use legend::{Legend, format_number};
pub use models::{Dataset, Feature, MissingPolicy, NumericValue};
pub use paint::{PaintStyle, build_style};
pub use selection::{Controller, SelectionState, SelectionUpdate};
