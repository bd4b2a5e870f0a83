use std::fmt::Display;
use std::net::IpAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

pub const DISCOVERY_PORT: u16 = 48899;

const DISCOVERY_REQUEST: &[u8] = b"WIFIKIT-214028-READ";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataLogger {
  pub address: String,
  pub mac: String,
  pub serial: String,
}

impl Display for DataLogger {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> Result<(), std::fmt::Error> {
    write!(
      f,
      "LoggerSN:   {}\nIP:         {}\nMAC:        {}",
      self.serial, self.address, self.mac
    )
  }
}

fn parse_reply(reply: &str) -> Option<DataLogger> {
  let mut fields = reply.split(',');
  let address = fields.next()?.trim();
  let mac = fields.next()?.trim();
  let serial = fields.next()?.trim();
  Some(DataLogger {
    address: address.to_owned(),
    mac: mac.to_owned(),
    serial: serial.to_owned(),
  })
}

/// Broadcast the vendor's discovery probe and collect every datalogger
/// that answers before `timeout` passes without a reply.
pub async fn discover(
  broadcast: IpAddr,
  timeout: Duration,
) -> std::io::Result<Vec<DataLogger>> {
  let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
  socket.set_broadcast(true)?;
  socket
    .send_to(DISCOVERY_REQUEST, (broadcast, DISCOVERY_PORT))
    .await?;

  let mut found = Vec::new();
  let mut buffer = [0u8; 1024];
  while let Ok(received) =
    tokio::time::timeout(timeout, socket.recv_from(&mut buffer)).await
  {
    let (length, peer) = received?;
    let reply = String::from_utf8_lossy(&buffer[..length]);
    match parse_reply(&reply) {
      Some(logger) => {
        tracing::debug!("datalogger {} answered from {}", logger.serial, peer);
        found.push(logger);
      }
      None => tracing::debug!("ignoring malformed reply from {}", peer),
    }
  }

  Ok(found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
  use super::*;

  #[test]
  fn replies_split_into_address_mac_and_serial() {
    let logger = parse_reply("192.168.1.108,E0:B9:4D:12:34:56,2799999999")
      .unwrap();
    assert_eq!(logger.address, "192.168.1.108");
    assert_eq!(logger.mac, "E0:B9:4D:12:34:56");
    assert_eq!(logger.serial, "2799999999");
  }

  #[test]
  fn malformed_replies_are_ignored() {
    assert!(parse_reply("192.168.1.108").is_none());
  }
}
