use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("payload failed schema validation for topic {topic:?}: {source}")]
    SchemaInvalid {
        topic: rsi_correlator_core::Topic,
        #[source]
        source: serde_json::Error,
    },
}
