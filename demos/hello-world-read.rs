// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reads two holding registers from a Modbus TCP device.

use tokio_plc::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let manager = DriverManager::new();
    let conn_str = "modbus:tcp://192.168.222.33?unit-identifier=32";

    println!("Connecting to {conn_str}");
    let connection = manager.connect(conn_str).await?;

    let request = connection
        .read_request_builder()
        .add_query("field_PV1", "holding-register:02:INT")
        .add_query("field_PV2", "holding-register:03:INT")
        .build()?;
    let response = request.execute().await?;

    for name in response.field_names() {
        match response.response_code(name) {
            ResponseCode::Ok => {
                if let Some(value) = response.value(name) {
                    println!("{name}: {}", value.as_i16()?);
                }
            }
            code => println!("{name}: non-ok response code {code}"),
        }
    }

    println!("Disconnecting");
    connection.close().await?;

    Ok(())
}
