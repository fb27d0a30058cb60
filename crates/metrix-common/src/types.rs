use crate::error::MetricError;
use serde::{Deserialize, Serialize};

/// Fractional digits used when rendering gauge values as text.
pub const GAUGE_TEXT_PRECISION: usize = 11;

/// Metric kind, the closed set of merge rules the store understands.
///
/// # Examples
///
/// ```
/// use metrix_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            other => Err(MetricError::NotImplemented(other.to_string())),
        }
    }
}

/// The payload of a metric. A value is always exactly one of the two.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(i64),
    Gauge(f64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// Canonical text rendering: integers for counters, fixed precision for
    /// gauges, so equal numbers always produce identical bytes.
    ///
    /// ```
    /// use metrix_common::types::MetricValue;
    ///
    /// assert_eq!(MetricValue::Counter(15).render(), "15");
    /// assert_eq!(MetricValue::Gauge(2.75).render(), "2.75000000000");
    /// ```
    pub fn render(&self) -> String {
        match self {
            MetricValue::Counter(v) => v.to_string(),
            MetricValue::Gauge(v) => format!("{v:.prec$}", prec = GAUGE_TEXT_PRECISION),
        }
    }
}

/// A named observation held by a [`crate::store::MetricStore`].
///
/// The text rendering is computed at construction and refreshed by every
/// constructor, so it can never drift from the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricRecord", into = "MetricRecord")]
pub struct Metric {
    id: String,
    value: MetricValue,
    text_value: String,
}

impl Metric {
    pub fn new(id: impl Into<String>, value: MetricValue) -> Self {
        let text_value = value.render();
        Self {
            id: id.into(),
            value,
            text_value,
        }
    }

    pub fn counter(id: impl Into<String>, value: i64) -> Self {
        Self::new(id, MetricValue::Counter(value))
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self::new(id, MetricValue::Gauge(value))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    pub fn value(&self) -> MetricValue {
        self.value
    }

    pub fn text_value(&self) -> &str {
        &self.text_value
    }

    pub fn counter_value(&self) -> Option<i64> {
        match self.value {
            MetricValue::Counter(v) => Some(v),
            MetricValue::Gauge(_) => None,
        }
    }

    pub fn gauge_value(&self) -> Option<f64> {
        match self.value {
            MetricValue::Gauge(v) => Some(v),
            MetricValue::Counter(_) => None,
        }
    }
}

/// Serialized form of a [`Metric`] in snapshots and ingest echoes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gauge_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_value: Option<String>,
}

impl TryFrom<MetricRecord> for Metric {
    type Error = MetricError;

    fn try_from(record: MetricRecord) -> Result<Self, Self::Error> {
        if record.id.is_empty() {
            return Err(MetricError::BadRequest("metric id is empty".to_string()));
        }
        let value = match (record.kind, record.counter_value, record.gauge_value) {
            (MetricKind::Counter, Some(v), None) => MetricValue::Counter(v),
            (MetricKind::Gauge, None, Some(v)) => MetricValue::Gauge(v),
            (kind, _, _) => {
                return Err(MetricError::BadRequest(format!(
                    "metric {} of type {kind} must carry exactly its own value",
                    record.id
                )))
            }
        };
        // text_value is derived, a stale one on disk is ignored
        Ok(Metric::new(record.id, value))
    }
}

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        MetricRecord {
            kind: metric.kind(),
            counter_value: metric.counter_value(),
            gauge_value: metric.gauge_value(),
            text_value: Some(metric.text_value),
            id: metric.id,
        }
    }
}

/// Ingest and retrieval wire shape.
///
/// `type` is kept as a raw string so an unknown kind surfaces as
/// [`MetricError::NotImplemented`] instead of a decode failure.
///
/// # Examples
///
/// ```
/// use metrix_common::types::MetricRequest;
///
/// let req: MetricRequest =
///     serde_json::from_str(r#"{"id":"Req","type":"counter","delta":5}"#).unwrap();
/// assert_eq!(req.raw_value().unwrap(), "5");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricRequest {
    /// A retrieval request: id and type only.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            kind: kind.to_string(),
            delta: None,
            value: None,
        }
    }

    /// Parsed kind of this request.
    pub fn metric_kind(&self) -> Result<MetricKind, MetricError> {
        self.kind.parse()
    }

    /// The raw textual value handed to [`crate::store::MetricStore::collect`].
    pub fn raw_value(&self) -> Result<String, MetricError> {
        match self.metric_kind()? {
            MetricKind::Counter => self
                .delta
                .map(|d| d.to_string())
                .ok_or_else(|| MetricError::BadRequest(format!("counter {} has no delta", self.id))),
            MetricKind::Gauge => self
                .value
                .map(|v| v.to_string())
                .ok_or_else(|| MetricError::BadRequest(format!("gauge {} has no value", self.id))),
        }
    }
}

impl From<&Metric> for MetricRequest {
    fn from(metric: &Metric) -> Self {
        Self {
            id: metric.id().to_string(),
            kind: metric.kind().to_string(),
            delta: metric.counter_value(),
            value: metric.gauge_value(),
        }
    }
}
