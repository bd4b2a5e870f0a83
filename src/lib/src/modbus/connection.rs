use std::net::SocketAddr;

use futures_time::future::FutureExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_modbus::{
  client::Context,
  prelude::{Reader, Writer},
  Quantity, Slave,
};

use super::record::Record;
use super::span::Span;

/// Words per holding register read, the Modbus ceiling.
pub const MAX_READ_QUANTITY: Quantity = 125;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Destination {
  pub address: SocketAddr,
  pub slave: u8,
}

impl Destination {
  /// The datalogger bridges the inverter bus at unit 1.
  pub fn logger(address: SocketAddr) -> Self {
    Self { address, slave: 1 }
  }
}

pub type Response = Vec<u16>;

#[derive(Debug)]
pub struct Connection {
  destination: Destination,
  ctx: Context,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
  #[error("Failed to connect")]
  Connect(#[from] std::io::Error),

  #[error("Wrong slave number")]
  Slave,
}

impl Connection {
  pub async fn connect(destination: Destination) -> Result<Self, ConnectError> {
    if Slave(destination.slave) < Slave::min_device()
      || Slave(destination.slave) > Slave::max_device()
    {
      return Err(ConnectError::Slave);
    }

    let stream = TcpStream::connect(destination.address).await?;
    let ctx = tokio_modbus::prelude::tcp::attach_slave(
      stream,
      Slave(destination.slave),
    );
    Ok(Self { destination, ctx })
  }

  pub fn socket(&self) -> SocketAddr {
    self.destination.address
  }

  pub fn slave(&self) -> u8 {
    self.destination.slave
  }
}

#[derive(Copy, Clone, Debug)]
pub struct Params {
  timeout: futures_time::time::Duration,
  backoff: tokio::time::Duration,
  retries: usize,
}

impl Params {
  pub fn new(
    timeout: chrono::Duration,
    backoff: chrono::Duration,
    retries: usize,
  ) -> Self {
    Self {
      timeout: timeout_from_chrono(timeout),
      backoff: backoff_from_chrono(backoff),
      retries,
    }
  }

  pub fn timeout(self) -> chrono::Duration {
    chrono::Duration::milliseconds(self.timeout.as_millis() as i64)
  }

  pub fn backoff(self) -> chrono::Duration {
    chrono::Duration::milliseconds(self.backoff.as_millis() as i64)
  }

  pub fn retries(self) -> usize {
    self.retries
  }
}

#[derive(Debug, Error)]
pub enum ReadError {
  #[error("Failed connecting")]
  Connection(std::io::Error),

  #[error("Connection timed out")]
  Timeout(std::io::Error),
}

#[derive(Debug, Error)]
pub enum WriteError {
  #[error("Failed connecting")]
  Connection(std::io::Error),

  #[error("Connection timed out")]
  Timeout(std::io::Error),
}

impl Connection {
  pub async fn parameterized_read<TSpan: Span>(
    &mut self,
    span: &TSpan,
    params: Params,
  ) -> Result<Response, Vec<ReadError>> {
    let mut errors = Vec::new();
    let mut response = None;
    while response.is_none() && errors.len() < params.retries {
      tokio::time::sleep(params.backoff).await;
      match self.simple_read_impl(span, params.timeout).await {
        Ok(data) => response = Some(data),
        Err(error) => errors.push(error),
      };
    }

    response.ok_or(errors)
  }

  pub async fn simple_read<TSpan: Span>(
    &mut self,
    span: &TSpan,
    timeout: chrono::Duration,
  ) -> Result<Response, ReadError> {
    self
      .simple_read_impl(span, timeout_from_chrono(timeout))
      .await
  }

  async fn simple_read_impl<TSpan: Span>(
    &mut self,
    span: &TSpan,
    timeout: futures_time::time::Duration,
  ) -> Result<Response, ReadError> {
    tracing::trace!(
      "reading {} words from {} at {}",
      span.quantity(),
      span.address(),
      self.destination.address
    );
    match self
      .ctx
      .read_holding_registers(span.address(), span.quantity())
      .timeout(timeout)
      .await
    {
      Ok(Ok(response)) => Ok(response),
      Ok(Err(error)) => Err(ReadError::Connection(error)),
      Err(error) => Err(ReadError::Timeout(error)),
    }
  }

  pub async fn parameterized_write<TRecord: Record>(
    &mut self,
    record: &TRecord,
    params: Params,
  ) -> Result<(), Vec<WriteError>> {
    let mut errors = Vec::new();
    while errors.len() < params.retries {
      tokio::time::sleep(params.backoff).await;
      match self.simple_write_impl(record, params.timeout).await {
        Ok(()) => return Ok(()),
        Err(error) => errors.push(error),
      };
    }

    Err(errors)
  }

  pub async fn simple_write<TRecord: Record>(
    &mut self,
    record: &TRecord,
    timeout: chrono::Duration,
  ) -> Result<(), WriteError> {
    self
      .simple_write_impl(record, timeout_from_chrono(timeout))
      .await
  }

  async fn simple_write_impl<TRecord: Record>(
    &mut self,
    record: &TRecord,
    timeout: futures_time::time::Duration,
  ) -> Result<(), WriteError> {
    let values = record.values().collect::<Vec<_>>();
    tracing::trace!(
      "writing {} words to {} at {}",
      values.len(),
      record.address(),
      self.destination.address
    );
    match self
      .ctx
      .write_multiple_registers(record.address(), values.as_slice())
      .timeout(timeout)
      .await
    {
      Ok(Ok(())) => Ok(()),
      Ok(Err(error)) => Err(WriteError::Connection(error)),
      Err(error) => Err(WriteError::Timeout(error)),
    }
  }
}

fn timeout_from_chrono(
  timeout: chrono::Duration,
) -> futures_time::time::Duration {
  futures_time::time::Duration::from_millis(timeout.num_milliseconds() as u64)
}

fn backoff_from_chrono(backoff: chrono::Duration) -> tokio::time::Duration {
  tokio::time::Duration::from_millis(backoff.num_milliseconds() as u64)
}
