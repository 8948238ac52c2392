//! Test helpers: an in-memory metrics source and sample builders

use crate::models::{Labels, QueryMode, Sample, SamplePoint};
use crate::source::{async_trait, FetchError, MetricsSource};
use std::sync::Mutex;

type Responder = Box<dyn Fn(&str, QueryMode) -> Result<Vec<Sample>, FetchError> + Send + Sync>;

/// Metrics source answering from a closure and recording every call
pub struct FakeSource {
    respond: Responder,
    calls: Mutex<Vec<(String, QueryMode)>>,
}

impl FakeSource {
    pub fn new(respond: impl Fn(&str, QueryMode) -> Vec<Sample> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(move |query, mode| Ok(respond(query, mode))),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Empty results, except a 500 for queries matching `fails`
    pub fn failing_when(fails: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(move |query, _| {
                if fails(query) {
                    Err(FetchError::Status {
                        url: query.to_string(),
                        status: 500,
                        body: "internal error".to_string(),
                    })
                } else {
                    Ok(Vec::new())
                }
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, QueryMode)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsSource for FakeSource {
    async fn fetch(
        &self,
        query: &str,
        _result_field: &str,
        mode: QueryMode,
    ) -> Result<Vec<Sample>, FetchError> {
        self.calls.lock().unwrap().push((query.to_string(), mode));
        (self.respond)(query, mode)
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn instant_sample(pairs: &[(&str, &str)], value: &str) -> Sample {
    Sample {
        metric: labels(pairs),
        value: Some(SamplePoint::new(1_700_000_000.0, value)),
        values: Vec::new(),
    }
}

pub fn range_sample(pairs: &[(&str, &str)], points: &[(f64, &str)]) -> Sample {
    Sample {
        metric: labels(pairs),
        value: None,
        values: points
            .iter()
            .map(|(ts, v)| SamplePoint::new(*ts, *v))
            .collect(),
    }
}
