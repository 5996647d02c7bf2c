// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

mod fake_device;

use tokio_plc::prelude::*;

use self::fake_device::{manager, Device};

#[tokio::test]
async fn read_fields_end_to_end() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    // Given
    let device = Device::new();
    let connection = manager(&device).connect("test://device").await?;
    let request = connection
        .read_request_builder()
        .add_query("value", "area:0:INT16")
        .add_query("flag", "area:1:BOOL")
        .build()?;

    // When
    let response = request.execute().await?;

    // Then
    assert_eq!(response.field_names().collect::<Vec<_>>(), ["value", "flag"]);
    assert_eq!(response.response_code("value"), ResponseCode::Ok);
    assert_eq!(response.value("value"), Some(&ResponseValue::Int16(42)));
    assert_eq!(response.response_code("flag"), ResponseCode::Ok);
    assert!(response.value("flag").unwrap().as_bool()?);
    assert!(response.all_ok());
    assert_eq!(device.reads(), 1);

    connection.close().await?;
    Ok(())
}

#[tokio::test]
async fn out_of_range_address_fails_only_the_field() -> anyhow::Result<()> {
    // Given
    let device = Device::new();
    let connection = manager(&device).connect("test://device").await?;
    let request = connection
        .read_request_builder()
        .add_query("far", "area:100:INT16")
        .add_query("near", "area:3:UINT16")
        .build()?;

    // When
    let response = request.execute().await?;

    // Then
    assert_eq!(response.len(), 2);
    assert_eq!(response.response_code("far"), ResponseCode::InvalidAddress);
    assert_eq!(response.value("far"), None);
    assert_eq!(response.value("near"), Some(&ResponseValue::UInt16(0xFFFF)));
    assert!(!response.all_ok());
    assert!(connection.is_connected());
    Ok(())
}

#[tokio::test]
async fn undecodable_data_is_a_remote_error() -> anyhow::Result<()> {
    let device = Device::new();
    let connection = manager(&device).connect("test://device").await?;
    let request = connection
        .read_request_builder()
        .add_query("truncated", "area:7:INT16")
        .build()?;

    let response = request.execute().await?;

    assert_eq!(
        response.response_code("truncated"),
        ResponseCode::RemoteError
    );
    assert_eq!(response.value("truncated"), None);
    Ok(())
}

#[tokio::test]
async fn read_arrays_and_descriptors() -> anyhow::Result<()> {
    let device = Device::new();
    let connection = manager(&device).connect("test://device").await?;
    let request = connection
        .read_request_builder()
        .add_query("array", "area:0:INT16[2]")
        .add_field(
            "descriptor",
            FieldDescriptor::new(MemoryArea::HoldingRegister, 1, DataType::Int16),
        )
        .build()?;
    assert_eq!(request.len(), 2);
    assert_eq!(
        request.field("array").map(FieldDescriptor::quantity),
        Some(2)
    );

    let response = request.execute().await?;

    assert_eq!(
        response.value("array").unwrap().as_list()?,
        [ResponseValue::Int16(42), ResponseValue::Int16(1)]
    );
    assert_eq!(response.value("descriptor").unwrap().as_i16()?, 1);
    Ok(())
}

#[tokio::test]
async fn invalid_queries_fail_at_build() -> anyhow::Result<()> {
    let device = Device::new();
    let connection = manager(&device).connect("test://device").await?;

    let err = connection
        .read_request_builder()
        .add_query("ok", "area:0")
        .add_query("bad", "area:zero")
        .build()
        .unwrap_err();
    match err {
        Error::InvalidQuery { field, source } => {
            assert_eq!(field, "bad");
            assert!(matches!(*source, Error::UnknownFieldSyntax { .. }));
        }
        err => panic!("unexpected error: {err}"),
    }

    let err = connection
        .read_request_builder()
        .add_query("real", "area:0:REAL")
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidQuery { source, .. } if matches!(*source, Error::UnsupportedDataType { .. })
    ));

    let err = connection
        .read_request_builder()
        .add_query("twice", "area:0")
        .add_query("twice", "area:1")
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateField(name) if name == "twice"));

    // Nothing has been sent to the device
    assert_eq!(device.reads(), 0);
    assert!(connection.is_connected());
    Ok(())
}

#[tokio::test]
async fn response_lookups() -> anyhow::Result<()> {
    let device = Device::new();
    let connection = manager(&device).connect("test://device").await?;
    let request = connection
        .read_request_builder()
        .add_query("value", "area:0")
        .build()?;

    let response = request.execute().await?;

    assert_eq!(response.response_code("missing"), ResponseCode::NotFound);
    assert!(response.get("missing").is_none());
    let value = response.value("value").unwrap();
    assert!(matches!(
        value.as_bool(),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(value.as_i32(), Err(Error::TypeMismatch { .. })));
    assert_eq!(value.as_i16()?, 42);
    Ok(())
}

#[tokio::test]
async fn empty_request_does_not_touch_the_device() -> anyhow::Result<()> {
    let device = Device::new();
    let connection = manager(&device).connect("test://device").await?;
    let request = connection.read_request_builder().build()?;
    assert!(request.is_empty());

    let response = request.execute().await?;

    assert!(response.is_empty());
    assert_eq!(device.reads(), 0);
    Ok(())
}

#[tokio::test]
async fn execute_request_repeatedly() -> anyhow::Result<()> {
    let device = Device::new();
    let connection = manager(&device).connect("test://device").await?;
    let request = connection
        .read_request_builder()
        .add_query("value", "area:0")
        .build()?;

    for _ in 0..3 {
        let response = request.execute().await?;
        assert_eq!(response.value("value"), Some(&ResponseValue::Int16(42)));
    }

    assert_eq!(device.reads(), 3);
    Ok(())
}
