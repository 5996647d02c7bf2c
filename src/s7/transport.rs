// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt, io};

use async_trait::async_trait;
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tokio_util::codec::Framed;

use super::{
    codec::{dst_tsap, IsoCodec, Tpdu},
    frame::{
        decode_ack_data, decode_read_var_response, decode_setup_communication,
        encode_read_var_request, encode_setup_communication, AckData, ReadItem,
        READ_VAR_REQUEST_OVERHEAD, READ_VAR_RESPONSE_OVERHEAD,
    },
    S7Parameters,
};
use crate::{
    bytes::Bytes,
    driver::{FieldData, Transport},
    FieldDescriptor, ResponseCode,
};

/// Upper limit of items in a single read var job.
const MAX_ITEMS_PER_JOB: usize = 20;

/// S7 client over ISO-on-TCP
#[derive(Debug)]
pub(crate) struct S7Transport<T> {
    framed: Framed<T, IsoCodec>,
    pdu_size: u16,
    pdu_ref: u16,
}

impl<T> S7Transport<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Opens the ISO connection and negotiates the PDU size.
    pub(crate) async fn connect(transport: T, params: &S7Parameters) -> io::Result<Self> {
        let mut client = Self {
            framed: Framed::new(transport, IsoCodec::default()),
            pdu_size: params.pdu_size,
            pdu_ref: 0,
        };
        client
            .framed
            .send(Tpdu::ConnectionRequest {
                dst_tsap: dst_tsap(params.rack, params.slot),
            })
            .await?;
        match client.receive().await? {
            Tpdu::ConnectionConfirm => {}
            tpdu => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Expected connection confirm, received {tpdu:?}"),
                ));
            }
        }
        let pdu_ref = client.next_pdu_ref();
        let ack = client
            .call(encode_setup_communication(pdu_ref, params.pdu_size), pdu_ref)
            .await?;
        let pdu_size = decode_setup_communication(&ack)?.min(params.pdu_size);
        if usize::from(pdu_size) < READ_VAR_RESPONSE_OVERHEAD + ReadItem::request_size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Negotiated PDU size too small: {pdu_size}"),
            ));
        }
        log::debug!("Negotiated PDU size: {pdu_size}");
        client.pdu_size = pdu_size;
        Ok(client)
    }

    fn next_pdu_ref(&mut self) -> u16 {
        self.pdu_ref = self.pdu_ref.wrapping_add(1);
        self.pdu_ref
    }

    async fn receive(&mut self) -> io::Result<Tpdu> {
        self.framed
            .next()
            .await
            .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::UnexpectedEof)))
    }

    async fn call(&mut self, pdu: Bytes, pdu_ref: u16) -> io::Result<AckData> {
        self.framed.send(Tpdu::Data(pdu)).await?;
        loop {
            let Tpdu::Data(pdu) = self.receive().await? else {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Expected data transfer",
                ));
            };
            let ack = decode_ack_data(&pdu)?;
            if ack.pdu_ref != pdu_ref {
                // Answer of a job that has been abandoned
                log::debug!("Discarding response with PDU reference {}", ack.pdu_ref);
                continue;
            }
            return Ok(ack);
        }
    }

    async fn read_items(&mut self, items: &[ReadItem]) -> io::Result<Vec<FieldData>> {
        log::debug!("Call read var {:?}", items);
        let pdu_ref = self.next_pdu_ref();
        let ack = self
            .call(encode_read_var_request(pdu_ref, items), pdu_ref)
            .await?;
        decode_read_var_response(&ack, items)
    }

    /// Groups items into jobs that fit into the negotiated PDU size.
    fn plan_jobs(&self, items: &[(usize, ReadItem)]) -> Vec<Vec<(usize, ReadItem)>> {
        let pdu_size = usize::from(self.pdu_size);
        let mut jobs = Vec::new();
        let mut job: Vec<(usize, ReadItem)> = Vec::new();
        let (mut request_size, mut response_size) =
            (READ_VAR_REQUEST_OVERHEAD, READ_VAR_RESPONSE_OVERHEAD);
        for (index, item) in items {
            let fits = job.len() < MAX_ITEMS_PER_JOB
                && request_size + ReadItem::request_size() <= pdu_size
                && response_size + item.response_size() <= pdu_size;
            if !fits && !job.is_empty() {
                jobs.push(std::mem::take(&mut job));
                request_size = READ_VAR_REQUEST_OVERHEAD;
                response_size = READ_VAR_RESPONSE_OVERHEAD;
            }
            request_size += ReadItem::request_size();
            response_size += item.response_size();
            job.push((*index, *item));
        }
        if !job.is_empty() {
            jobs.push(job);
        }
        jobs
    }
}

#[async_trait]
impl<T> Transport for S7Transport<T>
where
    T: fmt::Debug + AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn read(&mut self, fields: &[FieldDescriptor]) -> io::Result<Vec<FieldData>> {
        let max_response_size = usize::from(self.pdu_size) - READ_VAR_RESPONSE_OVERHEAD;
        let mut results: Vec<FieldData> = vec![Err(ResponseCode::RemoteError); fields.len()];
        let mut items = Vec::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            match ReadItem::for_field(field) {
                Ok(item) if item.response_size() <= max_response_size => {
                    items.push((index, item));
                }
                Ok(_) => {
                    log::debug!("{field} exceeds the PDU size of {}", self.pdu_size);
                    results[index] = Err(ResponseCode::InvalidAddress);
                }
                Err(code) => {
                    log::debug!("Cannot address {field}");
                    results[index] = Err(code);
                }
            }
        }
        for job in self.plan_jobs(&items) {
            let read_items: Vec<_> = job.iter().map(|(_, item)| *item).collect();
            let data = self.read_items(&read_items).await?;
            for ((index, _), item) in job.into_iter().zip(data) {
                results[index] = item;
            }
        }
        Ok(results)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.framed.get_mut().shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{duplex, AsyncReadExt as _, AsyncWriteExt as _, DuplexStream};

    use super::*;
    use crate::{DataType, MemoryArea};

    const PARAMS: S7Parameters = S7Parameters {
        rack: 0,
        slot: 1,
        pdu_size: 480,
    };

    async fn read_tpkt(server: &mut DuplexStream) -> Vec<u8> {
        let mut header = [0u8; 4];
        server.read_exact(&mut header).await.unwrap();
        let len = usize::from(u16::from_be_bytes([header[2], header[3]]));
        let mut body = vec![0u8; len - 4];
        server.read_exact(&mut body).await.unwrap();
        body
    }

    fn data_tpkt(pdu: &[u8]) -> Vec<u8> {
        let len = u16::try_from(pdu.len() + 7).unwrap().to_be_bytes();
        let mut tpkt = vec![0x03, 0x00, len[0], len[1], 0x02, 0xF0, 0x80];
        tpkt.extend_from_slice(pdu);
        tpkt
    }

    async fn write_data(server: &mut DuplexStream, pdu: &[u8]) {
        server.write_all(&data_tpkt(pdu)).await.unwrap();
    }

    fn read_int_response(pdu_ref: [u8; 2], value: u8) -> Vec<u8> {
        vec![
            0x32, 0x03, 0x00, 0x00, pdu_ref[0], pdu_ref[1], 0x00, 0x02, 0x00, 0x06, 0x00, 0x00,
            0x04, 0x01, 0xFF, 0x04, 0x00, 0x10, 0x00, value,
        ]
    }

    async fn handshake(server: &mut DuplexStream, pdu_size: u16) {
        let cr = read_tpkt(server).await;
        assert_eq!(cr[1], 0xE0);
        assert_eq!(&cr[cr.len() - 2..], [0x03, 0x01]);
        server
            .write_all(&[0x03, 0x00, 0x00, 0x0B, 0x06, 0xD0, 0x00, 0x01, 0x00, 0x0C, 0x00])
            .await
            .unwrap();
        let setup = read_tpkt(server).await;
        assert_eq!(setup[3..5], [0x32, 0x01]);
        let size = pdu_size.to_be_bytes();
        write_data(
            server,
            &[
                0x32, 0x03, 0x00, 0x00, setup[7], setup[8], 0x00, 0x08, 0x00, 0x00, 0x00, 0x00,
                0xF0, 0x00, 0x00, 0x01, 0x00, 0x01, size[0], size[1],
            ],
        )
        .await;
    }

    #[tokio::test]
    async fn negotiate_and_read() {
        let (client, mut server) = duplex(1024);
        let plc = tokio::spawn(async move {
            handshake(&mut server, 240).await;
            let job = read_tpkt(&mut server).await;
            // 3 bytes COTP, 10 bytes header, 2 bytes params, 2 items
            assert_eq!(job.len(), 3 + 10 + 2 + 24);
            assert_eq!(job[13..15], [0x04, 0x02]);
            write_data(
                &mut server,
                &[
                    0x32, 0x03, 0x00, 0x00, job[7], job[8], 0x00, 0x02, 0x00, 0x0B, 0x00, 0x00,
                    0x04, 0x02, // read var, 2 items
                    0xFF, 0x04, 0x00, 0x10, 0x00, 0xD7, // %M8:INT
                    0xFF, 0x03, 0x00, 0x01, 0x01, // %Q0.0:BOOL
                ],
            )
            .await;
        });
        let mut transport = S7Transport::connect(client, &PARAMS).await.unwrap();
        assert_eq!(transport.pdu_size, 240);
        let fields = [
            FieldDescriptor::new(MemoryArea::Memory, 8, DataType::Int16),
            FieldDescriptor::new(MemoryArea::Output, 0, DataType::Bool).with_bit(0),
            FieldDescriptor::new(MemoryArea::Coil, 0, DataType::Bool),
        ];
        let items = transport.read(&fields).await.unwrap();
        plc.await.unwrap();
        assert_eq!(items[0].as_ref().unwrap().as_ref(), [0x00, 0xD7]);
        assert_eq!(items[1].as_ref().unwrap().as_ref(), [0x01]);
        assert_eq!(items[2], Err(ResponseCode::InvalidAddress));
    }

    #[tokio::test]
    async fn split_jobs_by_pdu_size() {
        let (client, mut server) = duplex(1024);
        let plc = tokio::spawn(async move {
            handshake(&mut server, 240).await;
        });
        let transport = S7Transport::connect(client, &PARAMS).await.unwrap();
        plc.await.unwrap();
        let field =
            FieldDescriptor::new(MemoryArea::DataBlock, 0, DataType::String(100)).with_block(1);
        let item = ReadItem::for_field(&field).unwrap();
        // 102 bytes each, only two of them fit into a response
        let items: Vec<_> = (0..5).map(|index| (index, item)).collect();
        let jobs = transport.plan_jobs(&items);
        assert_eq!(jobs.iter().map(Vec::len).collect::<Vec<_>>(), [2, 2, 1]);
        assert_eq!(jobs[2][0].0, 4);
    }

    #[tokio::test]
    async fn complete_partial_response_after_timeout() {
        // Given
        let (client, mut server) = duplex(1024);
        let plc = tokio::spawn(async move {
            handshake(&mut server, 240).await;
            let job = read_tpkt(&mut server).await;
            let stale = data_tpkt(&read_int_response([job[7], job[8]], 1));
            let (head, tail) = stale.split_at(10);
            server.write_all(head).await.unwrap();
            let job = read_tpkt(&mut server).await;
            server.write_all(tail).await.unwrap();
            write_data(&mut server, &read_int_response([job[7], job[8]], 2)).await;
        });
        let mut transport = S7Transport::connect(client, &PARAMS).await.unwrap();
        let fields = [FieldDescriptor::new(MemoryArea::Memory, 8, DataType::Int16)];
        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), transport.read(&fields)).await;
        assert!(timed_out.is_err());

        // When
        let items = transport.read(&fields).await.unwrap();

        // Then
        plc.await.unwrap();
        assert_eq!(items[0].as_ref().unwrap().as_ref(), [0x00, 0x02]);
    }

    #[tokio::test]
    async fn refused_connection_request() {
        let (client, mut server) = duplex(1024);
        let plc = tokio::spawn(async move {
            read_tpkt(&mut server).await;
            // Disconnect request
            server
                .write_all(&[0x03, 0x00, 0x00, 0x0B, 0x06, 0x80, 0x00, 0x01, 0x00, 0x0C, 0x00])
                .await
                .unwrap();
        });
        let err = S7Transport::connect(client, &PARAMS).await.unwrap_err();
        plc.await.unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
