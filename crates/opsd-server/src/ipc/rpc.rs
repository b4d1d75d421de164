//! Typed encode/decode helpers for the Supervisor Facade's MRPC payloads.
//!
//! Centralizes wire shapes so the dispatch logic in
//! [`crate::ipc::service`] stays free of inline (de)serialization, mirroring
//! `hotki_server::ipc::rpc`'s `enc_*`/`dec_*` helpers and its convention of
//! surfacing a stable error code via `mrpc::ServiceError.name`.

use mrpc::{RpcError, ServiceError, Value};
use opsd_protocol::rpc::{RpcErrorCode, ScheduleDescriptor};
use opsd_protocol::{FacadeEvent, GuideProfile, HeaderCard, OperationsMode, PipelineFrame, SupervisorStatus};

/// Build an `RpcError::Service` carrying a stable [`RpcErrorCode`] name and
/// a free-form detail string.
fn typed_err(code: RpcErrorCode, detail: impl Into<String>) -> RpcError {
    RpcError::Service(ServiceError {
        name: code.name(),
        value: Value::String(detail.into().into()),
    })
}

/// Map a domain rejection (plus any schedule-validation violations) into a
/// transport-level error.
pub fn service_err(code: RpcErrorCode, violations: Vec<String>) -> RpcError {
    RpcError::Service(ServiceError {
        name: code.name(),
        value: Value::Array(violations.into_iter().map(|v| Value::String(v.into())).collect()),
    })
}

/// First positional parameter, or a `MissingParams` error.
pub fn require_param(params: &[Value]) -> Result<&Value, RpcError> {
    params
        .first()
        .ok_or_else(|| typed_err(RpcErrorCode::MissingParams, "expected one parameter"))
}

fn decode_binary<T: serde::de::DeserializeOwned>(v: &Value, what: &str) -> Result<T, RpcError> {
    match v {
        Value::Binary(bytes) => rmp_serde::from_slice(bytes)
            .map_err(|e| typed_err(RpcErrorCode::InvalidType, format!("malformed {what}: {e}"))),
        other => Err(typed_err(
            RpcErrorCode::InvalidType,
            format!("expected binary msgpack {what}, got {other:?}"),
        )),
    }
}

fn encode_binary<T: serde::Serialize>(value: &T, what: &str) -> Value {
    Value::Binary(rmp_serde::to_vec_named(value).unwrap_or_else(|e| panic!("{what} to msgpack: {e}")))
}

/// Decode a [`ScheduleDescriptor`] from `submit_schedule`'s parameter.
pub fn dec_schedule_descriptor(v: &Value) -> Result<ScheduleDescriptor, RpcError> {
    decode_binary(v, "schedule descriptor")
}

/// Encode `submit_schedule`'s non-fatal warnings as a response payload.
pub fn enc_warnings(warnings: &[String]) -> Value {
    Value::Array(warnings.iter().map(|w| Value::String(w.clone().into())).collect())
}

/// Decode an [`OperationsMode`] from a mode-change request's parameter.
pub fn dec_mode(v: &Value) -> Result<OperationsMode, RpcError> {
    decode_binary(v, "mode")
}

/// Encode an [`OperationsMode`] for a client-side request parameter.
pub fn enc_mode(mode: OperationsMode) -> Value {
    encode_binary(&mode, "mode")
}

/// Encode a full [`SupervisorStatus`] snapshot as a `status` response payload.
pub fn enc_status(status: &SupervisorStatus) -> Value {
    encode_binary(status, "status")
}

/// Decode a [`SupervisorStatus`] from a `status` response (client side).
pub fn dec_status(v: Value) -> Result<SupervisorStatus, RpcError> {
    decode_binary(&v, "status")
}

/// Decode a [`PipelineFrame`] header map from `notify_frame`'s parameter.
pub fn dec_pipeline_frame(v: &Value) -> Result<PipelineFrame, RpcError> {
    decode_binary(v, "pipeline frame")
}

/// Encode a [`PipelineFrame`] for a client-side `notify_frame` call.
pub fn enc_pipeline_frame(frame: &PipelineFrame) -> Value {
    encode_binary(frame, "pipeline frame")
}

/// Decode a [`GuideProfile`] from `notify_guide_profile`'s parameter.
pub fn dec_guide_profile(v: &Value) -> Result<GuideProfile, RpcError> {
    decode_binary(v, "guide profile")
}

/// Encode a [`GuideProfile`] for a client-side `notify_guide_profile` call.
pub fn enc_guide_profile(profile: &GuideProfile) -> Value {
    encode_binary(profile, "guide profile")
}

/// Encode the optional header cards a `notify_frame`/`notify_guide_profile`
/// callback returned.
pub fn enc_header_cards(cards: &Option<Vec<HeaderCard>>) -> Value {
    encode_binary(cards, "header cards")
}

/// Decode header cards from a `notify_frame`/`notify_guide_profile` response.
pub fn dec_header_cards(v: Value) -> Result<Option<Vec<HeaderCard>>, RpcError> {
    decode_binary(&v, "header cards")
}

/// Encode a Facade event for the `event` notification, matching
/// [`opsd_protocol::ipc::codec::event_to_value`].
pub fn enc_event(event: &FacadeEvent) -> Value {
    opsd_protocol::ipc::codec::event_to_value(event).expect("FacadeEvent to msgpack")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_roundtrips() {
        let v = enc_mode(OperationsMode::Automatic);
        assert_eq!(dec_mode(&v).unwrap(), OperationsMode::Automatic);
    }

    #[test]
    fn dec_mode_rejects_non_binary() {
        let err = dec_mode(&Value::Boolean(true)).unwrap_err();
        match err {
            RpcError::Service(se) => assert_eq!(se.name, RpcErrorCode::InvalidType.name()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn require_param_reports_missing_params() {
        let err = require_param(&[]).unwrap_err();
        match err {
            RpcError::Service(se) => assert_eq!(se.name, RpcErrorCode::MissingParams.name()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn header_cards_roundtrip_none_and_some() {
        let none: Option<Vec<HeaderCard>> = None;
        assert_eq!(dec_header_cards(enc_header_cards(&none)).unwrap(), none);

        let some = Some(vec![HeaderCard { key: "FOCUS".into(), value: serde_json::json!(1.5) }]);
        assert_eq!(dec_header_cards(enc_header_cards(&some)).unwrap(), some);
    }
}
