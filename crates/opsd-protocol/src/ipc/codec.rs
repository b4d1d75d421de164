//! Msgpack codec for [`FacadeEvent`], wrapped as an `mrpc::Value::Binary`
//! payload the way `hotki_protocol::ipc::codec` encodes `MsgToUI`.

use mrpc::Value;

use crate::FacadeEvent;

/// Encode an event as a binary msgpack value suitable for a notification
/// parameter or request/response payload.
pub fn event_to_value(event: &FacadeEvent) -> Result<Value, rmp_serde::encode::Error> {
    let bytes = rmp_serde::to_vec_named(event)?;
    Ok(Value::Binary(bytes))
}

/// Decode an event previously produced by [`event_to_value`].
pub fn value_to_event(value: Value) -> Result<FacadeEvent, DecodeError> {
    match value {
        Value::Binary(bytes) => rmp_serde::from_slice(&bytes).map_err(DecodeError::Decode),
        other => Err(DecodeError::WrongShape(format!("{:?}", other))),
    }
}

/// Errors decoding a wire value back into a [`FacadeEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The msgpack bytes did not decode as a `FacadeEvent`.
    #[error("failed to decode event: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    /// The value was not an `mrpc::Value::Binary`.
    #[error("unexpected value shape: {0}")]
    WrongShape(String),
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        EnclosureStatus, EnclosureStatusSnapshot, HeaderCard, LogRecord, OperationsMode,
        SubsystemStatus, SupervisorStatus,
    };

    fn ts() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn sample_status() -> SupervisorStatus {
        let subsystem = SubsystemStatus {
            mode: OperationsMode::Automatic,
            requested_mode: OperationsMode::Automatic,
            mode_updated: ts(),
        };
        SupervisorStatus {
            scheduler: subsystem,
            enclosure: EnclosureStatusSnapshot {
                subsystem,
                status: EnclosureStatus::Closed,
                status_updated: ts(),
                window: None,
            },
            verdict: None,
            schedule: Vec::new(),
        }
    }

    #[test]
    fn roundtrips_every_variant() {
        let events = vec![
            FacadeEvent::Log(LogRecord {
                timestamp: ts(),
                log_name: "opsd.enclosure".into(),
                level: "info".into(),
                message: "dome opening".into(),
            }),
            FacadeEvent::StatusChanged(Box::new(sample_status())),
            FacadeEvent::ExtraHeaderCards(vec![HeaderCard {
                key: "FOCUS".into(),
                value: serde_json::json!(12.5),
            }]),
            FacadeEvent::Heartbeat(42),
        ];

        for event in events {
            let value = event_to_value(&event).expect("encode");
            let decoded = value_to_event(value).expect("decode");
            assert_eq!(
                serde_json::to_value(&decoded).unwrap(),
                serde_json::to_value(&event).unwrap()
            );
        }
    }

    #[test]
    fn rejects_non_binary_value() {
        let err = value_to_event(Value::Boolean(true)).unwrap_err();
        assert!(matches!(err, DecodeError::WrongShape(_)));
    }
}
