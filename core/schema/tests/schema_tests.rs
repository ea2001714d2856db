// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Schema derivation of whole services.

use prost_reflect::{Cardinality as WireCardinality, Kind};
use typedrpc_schema::{
    Cardinality, Message, Mode, ProcedureSchema, ProtoRenderer, SchemaError, SchemaHandle,
    ServiceSchema, Signature,
};
use typedrpc_testing::{
    ComplexModel, ComplexRequest, ComplexResponse, Matrix, Number, Ping, PingRequest,
    PingResponse, Pong, Sparse, Sum, Tree,
};

fn service(name: &str, signatures: &[(Signature, Mode)]) -> Result<ServiceSchema, SchemaError> {
    let procedures = signatures
        .iter()
        .map(|(signature, mode)| ProcedureSchema::build(signature, *mode))
        .collect::<Result<Vec<_>, _>>()?;
    ServiceSchema::new(name, None, procedures)
}

fn materialize(schema: &ServiceSchema) -> SchemaHandle {
    SchemaHandle::materialize(schema, &ProtoRenderer).unwrap()
}

const PING_IDL: &str = r#"syntax = "proto3";

package ping_service;

service PingService {
  rpc Ping(PingRequest) returns (PingResponse);
}

message PingRequest {
  string id = 1;
}

message PingResponse {
  string id = 1;
  string timestamp = 2;
}
"#;

const PASSTHROUGH_IDL: &str = r#"syntax = "proto3";

package ping_service;

service PingService {
  rpc Ping(BytesMessage) returns (BytesMessage);
}

message BytesMessage {
  bytes bytes = 1;
}
"#;

#[test]
#[tracing_test::traced_test]
fn test_ping_idl() {
    let schema = service(
        "PingService",
        &[(
            Signature::unary::<PingRequest, PingResponse>("ping"),
            Mode::Structured,
        )],
    )
    .unwrap();
    assert_eq!(materialize(&schema).idl(), PING_IDL);
    assert!(logs_contain("schema resolved"));
    assert!(logs_contain("ping_service.PingService"));
}

#[test]
fn test_passthrough_idl() {
    let schema = service(
        "PingService",
        &[(
            Signature::unary::<PingRequest, PingResponse>("ping"),
            Mode::Passthrough,
        )],
    )
    .unwrap();
    let handle = materialize(&schema);
    assert_eq!(handle.idl(), PASSTHROUGH_IDL);
    assert!(handle.message("PingRequest").is_none());
}

#[test]
fn test_idl_is_deterministic() {
    let signatures = || {
        vec![
            (
                Signature::unary::<ComplexRequest, ComplexResponse>("complex"),
                Mode::Structured,
            ),
            (Signature::stream_unary::<Number, Sum>("sum"), Mode::Structured),
            (Signature::unary::<Tree, Tree>("tree_sum"), Mode::Structured),
            (
                Signature::unary::<PingRequest, PingResponse>("ping"),
                Mode::Passthrough,
            ),
        ]
    };

    let first = materialize(&service("ExampleService", &signatures()).unwrap());
    let second = materialize(&service("ExampleService", &signatures()).unwrap());
    assert_eq!(first.idl(), second.idl());
    assert!(first.idl().contains("rpc Sum(stream Number) returns (Sum);"));
    assert!(first.idl().contains("rpc Ping(BytesMessage) returns (BytesMessage);"));
    assert!(first.idl().contains("  optional Tree left = 2;"));
    assert!(first.idl().contains("  map<uint32, int64> counters = 15;"));
    assert!(first.idl().contains("  repeated Address history = 18;"));
}

#[test]
fn test_stream_cardinalities() {
    let schema = service(
        "NumberService",
        &[
            (Signature::unary_stream::<Number, Number>("count"), Mode::Structured),
            (Signature::stream_stream::<Number, Number>("double"), Mode::Structured),
        ],
    )
    .unwrap();
    assert_eq!(schema.procedures()[0].cardinality(), Cardinality::UnaryStream);
    assert_eq!(schema.procedures()[1].cardinality(), Cardinality::StreamStream);

    let handle = materialize(&schema);
    let methods: Vec<_> = handle.service().unwrap().methods().collect();
    assert!(!methods[0].is_client_streaming() && methods[0].is_server_streaming());
    assert!(methods[1].is_client_streaming() && methods[1].is_server_streaming());
    assert_eq!(handle.path("Count"), "/number_service.NumberService/Count");
}

#[test]
fn test_complex_descriptor() {
    let schema = service(
        "ComplexService",
        &[(
            Signature::unary::<ComplexRequest, ComplexResponse>("complex"),
            Mode::Structured,
        )],
    )
    .unwrap();
    assert!(schema.messages().contains("Address"));

    let handle = materialize(&schema);
    let model = handle.message("ComplexModel").unwrap();
    assert_eq!(model.fields().count(), ComplexModel::fields().len());

    let raw = model.get_field_by_name("raw").unwrap();
    assert_eq!(raw.kind(), Kind::Bytes);

    let nickname = model.get_field_by_name("nickname").unwrap();
    assert!(nickname.supports_presence());

    let scores = model.get_field_by_name("scores").unwrap();
    assert_eq!(scores.cardinality(), WireCardinality::Repeated);
    assert_eq!(scores.kind(), Kind::Int32);

    let directory = model.get_field_by_name("directory").unwrap();
    assert!(directory.is_map());
    let Kind::Message(entry) = directory.kind() else {
        panic!("map field without entry message");
    };
    assert_eq!(entry.map_entry_key_field().kind(), Kind::String);
    assert!(matches!(entry.map_entry_value_field().kind(), Kind::Message(m) if m.name() == "Address"));

    let name = model.get_field_by_name("name").unwrap();
    assert_eq!(name.kind(), Kind::String);
}

#[test]
fn test_mutual_recursion() {
    let procedure =
        ProcedureSchema::build(&Signature::unary::<Ping, Pong>("rally"), Mode::Structured).unwrap();
    assert_eq!(procedure.closure().len(), 2);
    assert_eq!(procedure.additional_messages().count(), 0);

    let schema = ServiceSchema::new("RallyService", None, vec![procedure]).unwrap();
    let handle = materialize(&schema);
    let ping = handle.message("Ping").unwrap();
    let Kind::Message(pong) = ping.get_field_by_name("pong").unwrap().kind() else {
        panic!("pong is not a message");
    };
    assert_eq!(pong.full_name(), "rally_service.Pong");
}

#[test]
fn test_nested_messages_are_additional() {
    let procedure = ProcedureSchema::build(
        &Signature::unary::<ComplexRequest, ComplexResponse>("complex"),
        Mode::Passthrough,
    )
    .unwrap();
    let mut additional: Vec<_> = procedure
        .additional_messages()
        .map(|m| m.name.clone())
        .collect();
    additional.sort();
    assert_eq!(additional, vec!["Address", "ComplexModel"]);
    assert_eq!(procedure.wire_request_name(), "BytesMessage");
}

#[test]
fn test_unsupported_field_fails_derivation() {
    let err = ProcedureSchema::build(
        &Signature::unary::<Matrix, Matrix>("transpose"),
        Mode::Structured,
    )
    .unwrap_err();
    let SchemaError::UnsupportedType { field, .. } = &err else {
        panic!("unexpected error {}", err);
    };
    assert_eq!(field, "rows");
}

#[test]
fn test_duplicate_rpc_names() {
    let err = service(
        "EchoService",
        &[
            (Signature::unary::<Number, Number>("echo"), Mode::Structured),
            (Signature::unary::<Number, Number>("echo"), Mode::Passthrough),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateProcedure(name) if name == "Echo"));
}

#[test]
fn test_optional_elements_fail_derivation() {
    let err = ProcedureSchema::build(
        &Signature::unary::<Sparse, Sparse>("compact"),
        Mode::Structured,
    )
    .unwrap_err();
    let SchemaError::UnsupportedType { field, reason, .. } = &err else {
        panic!("unexpected error {}", err);
    };
    assert_eq!(field, "values");
    assert!(reason.contains("optional elements"), "{}", reason);
}
