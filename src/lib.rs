//! A named-metric registry you can scrape.
//!
//! Declare families of counters, gauges and histograms on a [`Metrics`]
//! facade, mutate their instances by family name and label set, and expose the
//! whole registry over HTTP in the Prometheus text format.
//!
//! ```no_run
//! use pullmetrics::Metrics;
//!
//! let metrics = Metrics::new();
//! metrics
//!     .add_counter_family("requests_total", "Handled requests", &[("service", "api")])
//!     .unwrap();
//! metrics.serve("0.0.0.0:8080").unwrap();
//!
//! // Slow path: by name, merges labels and looks the instance up every time.
//! metrics.increment("requests_total", &[("method", "GET")], 1.0);
//!
//! // Fast path: resolve the instance once and keep the handle.
//! let get = metrics
//!     .counter_family("requests_total")
//!     .unwrap()
//!     .add(&[("method", "GET")])
//!     .unwrap();
//! get.incr();
//! ```
//!
//! Nothing here is global. Pass the [`Metrics`] (or a [`Recorder`]) to the
//! components that need to record things.

mod encoding;
mod error;
mod exposer;
mod facade;
mod family;
mod labels;
mod metrics;
mod registry;
mod utils;

pub use encoding::{encode, CONTENT_TYPE};
pub use error::{Error, Result};
pub use exposer::{Exposer, ExposerConfig, DEFAULT_ENDPOINT, DEFAULT_GRACE_PERIOD, DEFAULT_PATH};
pub use facade::{Metrics, Recorder};
pub use family::{CounterDef, Family, FamilyDef, GaugeDef, HistogramDef};
pub use labels::Labels;
pub use metrics::{
    counter::Counter, gauge::Gauge, histogram::Histogram, HistogramSnapshot, Metric, MetricKind,
    MetricValue,
};
pub use registry::{FamilySnapshot, Registry, Sample};
