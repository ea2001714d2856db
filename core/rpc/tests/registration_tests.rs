// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Registration, schema resolution and request validation.

use bytes::Bytes;
use typedrpc::marshal::encode_wire;
use typedrpc::schema::{DeclaredType, SchemaError};
use typedrpc::{
    CallContext, Code, Declare, Metadata, Mode, RpcError, Server, ServiceConfig,
    ServiceDescriptor, Signature,
};
use typedrpc_testing::{
    Matrix, Number, Ping, PingRequest, PingResponse, Pong, Sparse, example_declarations,
    example_service,
};

#[test]
fn test_duplicate_registration() {
    let mut service = ServiceDescriptor::new("EchoService");
    service
        .unary("echo", |request: Number, _ctx| async move { Ok(Some(request)) })
        .unwrap();

    let err = service
        .unary("echo", |request: Number, _ctx| async move { Ok(Some(request)) })
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::Schema(SchemaError::DuplicateProcedure(name)) if name == "echo"
    ));
}

#[test]
fn test_unsupported_type_rejects_registration() {
    let mut service = ServiceDescriptor::new("MatrixService");
    let err = service
        .unary("transpose", |request: Matrix, _ctx| async move {
            Ok(Some(request))
        })
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::Schema(SchemaError::UnsupportedType { .. })
    ));
    assert!(service.procedure("transpose").is_none());
}

#[test]
fn test_optional_elements_reject_registration() {
    let mut service = ServiceDescriptor::new("SparseService");
    let err = service
        .unary("compact", |request: Sparse, _ctx| async move {
            Ok(Some(request))
        })
        .unwrap_err();
    let RpcError::Schema(SchemaError::UnsupportedType { field, .. }) = &err else {
        panic!("unexpected error {}", err);
    };
    assert_eq!(field, "values");
    assert!(service.procedure("compact").is_none());
}

#[test]
fn test_signature_arity() {
    let mut service = ServiceDescriptor::new("ArityService");

    let two_params = Signature::new("add")
        .param("request", Number::declared_type())
        .param("other", Number::declared_type())
        .returns(Number::declared_type());
    assert!(matches!(
        service.declare(two_params).unwrap_err(),
        RpcError::Schema(SchemaError::MethodSignature { .. })
    ));

    let no_return = Signature::new("fire").param("request", Number::declared_type());
    assert!(matches!(
        service.declare(no_return).unwrap_err(),
        RpcError::Schema(SchemaError::MethodSignature { .. })
    ));

    let scalar_request = Signature::new("raw")
        .param("request", DeclaredType::I64)
        .returns(Number::declared_type());
    assert!(matches!(
        service.declare(scalar_request).unwrap_err(),
        RpcError::Schema(SchemaError::MethodSignature { .. })
    ));

    let two_streamed = Signature::new("zip")
        .param(
            "requests",
            DeclaredType::Stream(vec![Number::declared_type(), Number::declared_type()]),
        )
        .returns(Number::declared_type());
    assert!(service.declare(two_streamed).is_err());

    assert_eq!(service.procedures().count(), 0);
}

#[test]
fn test_mutual_recursion_closure() {
    let mut service = ServiceDescriptor::new("RallyService");
    service
        .declare(Signature::unary::<Ping, Pong>("rally"))
        .unwrap();

    let handle = service.resolve_schema().unwrap();
    assert!(handle.message("Ping").is_some());
    assert!(handle.message("Pong").is_some());

    let messages = service.messages().unwrap();
    assert_eq!(messages.names().collect::<Vec<_>>(), vec!["Ping", "Pong"]);
}

#[test]
fn test_resolution_is_cached_and_deterministic() {
    let mut first = example_service(Mode::Structured).unwrap();
    let mut second = example_service(Mode::Structured).unwrap();

    let idl = first.resolve_schema().unwrap().idl().to_string();
    assert_eq!(first.resolve_schema().unwrap().idl(), idl);
    assert_eq!(second.resolve_schema().unwrap().idl(), idl);

    // registration is closed once resolved
    let err = first
        .unary("late", |request: Number, _ctx| async move { Ok(Some(request)) })
        .unwrap_err();
    assert!(matches!(err, RpcError::Config(_)));
}

#[test]
fn test_server_and_client_schemas_agree() {
    for mode in [Mode::Structured, Mode::Passthrough] {
        let mut server_side = example_service(mode).unwrap();
        let mut client_side = example_declarations(mode).unwrap();
        assert_eq!(
            server_side.resolve_schema().unwrap().idl(),
            client_side.resolve_schema().unwrap().idl()
        );
    }
}

#[test]
fn test_wire_types_bound() {
    let mut service = example_service(Mode::Passthrough).unwrap();
    assert!(service.procedure("ping").unwrap().wire_types().is_err());

    service.resolve_schema().unwrap();
    let wire = service.procedure("ping").unwrap().wire_types().unwrap();
    assert_eq!(wire.request.name(), "BytesMessage");
    assert_eq!(wire.response.name(), "BytesMessage");
    assert_eq!(wire.path, "/example_service.ExampleService/Ping");
}

#[test]
fn test_mode_from_config() {
    let config = ServiceConfig::from_yaml(
        r#"
mode: passthrough
package: demo.v1
procedures:
  ping:
    mode: structured
"#,
    )
    .unwrap();

    let mut service = ServiceDescriptor::from_config("ExampleService", &config);
    service
        .declare(Signature::unary::<PingRequest, PingResponse>("ping"))
        .unwrap()
        .declare(Signature::unary::<Number, Number>("echo"))
        .unwrap()
        .declare_with_mode(Signature::unary::<Number, Number>("forced"), Mode::Structured)
        .unwrap();

    assert_eq!(service.procedure("ping").unwrap().mode(), Mode::Structured);
    assert_eq!(service.procedure("echo").unwrap().mode(), Mode::Passthrough);
    assert_eq!(service.procedure("forced").unwrap().mode(), Mode::Structured);

    let handle = service.resolve_schema().unwrap();
    assert_eq!(handle.package(), "demo.v1");
    assert_eq!(handle.path("Ping"), "/demo.v1.ExampleService/Ping");
}

#[tokio::test]
async fn test_malformed_request_is_invalid_argument() {
    let server = Server::builder()
        .add_service(example_service(Mode::Structured).unwrap())
        .unwrap()
        .build()
        .unwrap();

    let status = server
        .handle_unary(
            "/example_service.ExampleService/Ping",
            Bytes::from_static(&[0xff, 0xff, 0xff]),
            Metadata::new(),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(RpcError::validation_details(&status).is_some());
}

#[tokio::test]
async fn test_invalid_field_value_is_invalid_argument() {
    let server = Server::builder()
        .add_service(example_service(Mode::Structured).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let service = server.service("ExampleService").unwrap();
    let wire = service.procedure("ping").unwrap().wire_types().unwrap();

    let mut request = prost_reflect::DynamicMessage::new(wire.request.clone());
    request
        .try_set_field_by_name("id", prost_reflect::Value::String("not-a-uuid".to_string()))
        .unwrap();

    let status = server
        .dispatch(&wire.path, request.clone(), CallContext::default())
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let details = RpcError::validation_details(&status).unwrap();
    assert!(!details.reason.is_empty());

    let status = server
        .handle_unary(&wire.path, encode_wire(&request), Metadata::new(), None)
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}
