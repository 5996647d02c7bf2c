// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt, io};

use async_trait::async_trait;
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tokio_util::codec::Framed;

use super::{
    codec::ClientCodec,
    frame::{ExceptionCode, Header, Request, RequestAdu, Response, ResponsePdu, TransactionId, UnitId},
};
use crate::{
    driver::{FieldData, Transport},
    FieldDescriptor,
};

const INITIAL_TRANSACTION_ID: TransactionId = 0;

/// Responses with a transaction id that lags behind by at most this
/// distance are answers to requests that have already been abandoned.
const MAX_STALE_DISTANCE: TransactionId = 0x100;

/// Modbus TCP client
#[derive(Debug)]
pub(crate) struct ModbusTransport<T> {
    framed: Framed<T, ClientCodec>,
    unit_id: UnitId,
    transaction_id: TransactionId,
}

impl<T> ModbusTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(transport: T, unit_id: UnitId) -> Self {
        let framed = Framed::new(transport, ClientCodec);
        Self {
            framed,
            unit_id,
            transaction_id: INITIAL_TRANSACTION_ID,
        }
    }

    fn next_transaction_id(&mut self) -> TransactionId {
        let transaction_id = self.transaction_id;
        self.transaction_id = transaction_id.wrapping_add(1);
        transaction_id
    }

    fn next_request_adu(&mut self, pdu: Request) -> RequestAdu {
        RequestAdu {
            hdr: Header {
                transaction_id: self.next_transaction_id(),
                unit_id: self.unit_id,
            },
            pdu,
        }
    }

    pub(crate) async fn call(
        &mut self,
        req: Request,
    ) -> io::Result<Result<Response, ExceptionCode>> {
        log::debug!("Call {:?}", req);
        let req_adu = self.next_request_adu(req);
        let req_hdr = req_adu.hdr;
        self.framed.send(req_adu).await?;
        loop {
            let res_adu = self
                .framed
                .next()
                .await
                .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::UnexpectedEof)))?;
            let lag = req_hdr
                .transaction_id
                .wrapping_sub(res_adu.hdr.transaction_id);
            if (1..=MAX_STALE_DISTANCE).contains(&lag) {
                log::debug!("Discarding stale response {:?}", res_adu.hdr);
                continue;
            }
            verify_response_header(&req_hdr, &res_adu.hdr)?;
            return match res_adu.pdu {
                ResponsePdu(Ok(res)) => verify_response(&req, &res).and(Ok(Ok(res))),
                ResponsePdu(Err(err)) => {
                    if err.function != req.function.value() {
                        return Err(invalid_data(format!(
                            "Exception for unexpected function: 0x{:02X}",
                            err.function
                        )));
                    }
                    Ok(Err(err.exception))
                }
            };
        }
    }
}

#[async_trait]
impl<T> Transport for ModbusTransport<T>
where
    T: fmt::Debug + AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn read(&mut self, fields: &[FieldDescriptor]) -> io::Result<Vec<FieldData>> {
        let mut items = Vec::with_capacity(fields.len());
        for field in fields {
            let req = match Request::for_field(field) {
                Ok(req) => req,
                Err(code) => {
                    log::debug!("Cannot read {field} with a single request");
                    items.push(Err(code));
                    continue;
                }
            };
            let item = match self.call(req).await? {
                Ok(res) => Ok(res.data),
                Err(exception) => {
                    log::debug!(
                        "Reading {field} failed with exception 0x{:02X}: {exception}",
                        exception.value()
                    );
                    Err(exception.response_code())
                }
            };
            items.push(item);
        }
        Ok(items)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.framed.get_mut().shutdown().await
    }
}

/// Check that `req_hdr` is the same `Header` as `rsp_hdr`.
///
/// # Errors
///
/// If the 2 headers are different, an [`io::Error`] will be returned with [`io::ErrorKind::InvalidData`].
fn verify_response_header(req_hdr: &Header, rsp_hdr: &Header) -> io::Result<()> {
    if req_hdr != rsp_hdr {
        return Err(invalid_data(format!(
            "Invalid response header: expected/request = {req_hdr:?}, actual/response = {rsp_hdr:?}"
        )));
    }
    Ok(())
}

fn verify_response(req: &Request, res: &Response) -> io::Result<()> {
    if req.function != res.function {
        return Err(invalid_data(format!(
            "Invalid response function: expected/request = {:?}, actual/response = {:?}",
            req.function, res.function
        )));
    }
    if req.response_len() != res.data.len() {
        return Err(invalid_data(format!(
            "Invalid response length: expected/request = {}, actual/response = {}",
            req.response_len(),
            res.data.len()
        )));
    }
    Ok(())
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{duplex, AsyncReadExt as _, AsyncWriteExt as _};

    use super::*;
    use crate::{modbus::frame::FunctionCode, DataType, MemoryArea, ResponseCode};

    #[test]
    fn validate_same_headers() {
        // Given
        let req_hdr = Header {
            unit_id: 0,
            transaction_id: 42,
        };
        let rsp_hdr = Header {
            unit_id: 0,
            transaction_id: 42,
        };

        // When
        let result = verify_response_header(&req_hdr, &rsp_hdr);

        // Then
        assert!(result.is_ok());
    }

    #[test]
    fn invalid_validate_not_same_unit_id() {
        // Given
        let req_hdr = Header {
            unit_id: 0,
            transaction_id: 42,
        };
        let rsp_hdr = Header {
            unit_id: 5,
            transaction_id: 42,
        };

        // When
        let result = verify_response_header(&req_hdr, &rsp_hdr);

        // Then
        assert!(matches!(
            result,
            Err(err) if err.kind() == io::ErrorKind::InvalidData));
    }

    #[test]
    fn invalid_response_length() {
        // Given
        let req = Request {
            function: FunctionCode::ReadHoldingRegisters,
            address: 0,
            quantity: 2,
        };
        let res = Response {
            function: FunctionCode::ReadHoldingRegisters,
            data: crate::bytes::Bytes::from_static(&[0x00, 0x01]),
        };

        // When
        let result = verify_response(&req, &res);

        // Then
        assert!(matches!(
            result,
            Err(err) if err.kind() == io::ErrorKind::InvalidData));
    }

    #[tokio::test]
    async fn read_fields_and_exceptions() {
        // Given
        let (client, mut server) = duplex(256);
        let mut transport = ModbusTransport::new(client, 0x11);
        let fields = [
            FieldDescriptor::new(MemoryArea::HoldingRegister, 2, DataType::Int16),
            FieldDescriptor::new(MemoryArea::HoldingRegister, 70_000, DataType::Int16),
            FieldDescriptor::new(MemoryArea::Coil, 9, DataType::Bool),
        ];
        let device = tokio::spawn(async move {
            let mut req = [0u8; 12];
            server.read_exact(&mut req).await.unwrap();
            assert_eq!(
                req,
                [0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x02, 0x00, 0x01]
            );
            server
                .write_all(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x11, 0x03, 0x02, 0xFF, 0xFE])
                .await
                .unwrap();
            server.read_exact(&mut req).await.unwrap();
            assert_eq!(&req[6..], [0x11, 0x01, 0x00, 0x09, 0x00, 0x01]);
            server
                .write_all(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x11, 0x81, 0x02])
                .await
                .unwrap();
        });

        // When
        let items = transport.read(&fields).await.unwrap();

        // Then
        device.await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().as_ref(), [0xFF, 0xFE]);
        assert_eq!(items[1], Err(ResponseCode::InvalidAddress));
        assert_eq!(items[2], Err(ResponseCode::InvalidAddress));
    }

    #[tokio::test]
    async fn discard_stale_responses() {
        // Given
        let (client, mut server) = duplex(256);
        let mut transport = ModbusTransport::new(client, 1);
        transport.transaction_id = 5;
        let device = tokio::spawn(async move {
            let mut req = [0u8; 12];
            server.read_exact(&mut req).await.unwrap();
            // Late answer to transaction 4, then the actual answer
            server
                .write_all(&[0x00, 0x04, 0x00, 0x00, 0x00, 0x05, 0x01, 0x04, 0x02, 0x00, 0x01])
                .await
                .unwrap();
            server
                .write_all(&[0x00, 0x05, 0x00, 0x00, 0x00, 0x05, 0x01, 0x04, 0x02, 0x00, 0x02])
                .await
                .unwrap();
        });

        // When
        let res = transport
            .call(Request {
                function: FunctionCode::ReadInputRegisters,
                address: 0,
                quantity: 1,
            })
            .await
            .unwrap()
            .unwrap();

        // Then
        device.await.unwrap();
        assert_eq!(res.data.as_ref(), [0x00, 0x02]);
    }

    #[tokio::test]
    async fn complete_partial_response_after_timeout() {
        // Given
        let (client, mut server) = duplex(256);
        let mut transport = ModbusTransport::new(client, 1);
        let request = Request {
            function: FunctionCode::ReadInputRegisters,
            address: 0,
            quantity: 1,
        };
        let device = tokio::spawn(async move {
            let mut req = [0u8; 12];
            server.read_exact(&mut req).await.unwrap();
            server
                .write_all(&[0x00, 0x00, 0x00, 0x00, 0x00])
                .await
                .unwrap();
            server.read_exact(&mut req).await.unwrap();
            assert_eq!(req[..2], [0x00, 0x01]);
            // Remainder of transaction 0, then transaction 1
            server
                .write_all(&[0x05, 0x01, 0x04, 0x02, 0x00, 0x01])
                .await
                .unwrap();
            server
                .write_all(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x04, 0x02, 0x00, 0x02])
                .await
                .unwrap();
        });
        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), transport.call(request)).await;
        assert!(timed_out.is_err());

        // When
        let res = transport.call(request).await.unwrap().unwrap();

        // Then
        device.await.unwrap();
        assert_eq!(res.data.as_ref(), [0x00, 0x02]);
    }

    #[tokio::test]
    async fn disconnected_device() {
        let (client, server) = duplex(256);
        drop(server);
        let mut transport = ModbusTransport::new(client, 1);
        let fields = [FieldDescriptor::new(
            MemoryArea::InputRegister,
            0,
            DataType::UInt16,
        )];
        assert!(transport.read(&fields).await.is_err());
    }
}
