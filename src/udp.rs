use std::{
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    thread,
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::ArmorPlate;

/// Aim command sent to the turret controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AimMessage {
    /// Seconds since the Unix epoch at send time.
    pub timestamp: f64,
    pub distance: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub flight_time: f64,
}

impl AimMessage {
    pub fn from_plate(plate: &ArmorPlate, now: SystemTime) -> Self {
        AimMessage {
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs_f64())
                .unwrap_or_default(),
            distance: plate.distance,
            yaw: plate.angle_x,
            pitch: plate.angle_y,
            flight_time: plate.flight_time,
        }
    }
}

pub struct UdpSender {
    socket: UdpSocket,
}

impl UdpSender {
    /// Binds `src_port` and connects to `dst_address`, retrying the lookup
    /// until the host shows up on the network.
    pub fn new(src_port: u16, dst_address: impl ToSocketAddrs) -> Result<UdpSender> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], src_port)))
            .with_context(|| format!("Failed to bind UDP port {}", src_port))?;

        while let Err(error) = socket.connect(&dst_address) {
            warn!("destination not reachable yet: {}", error);
            thread::sleep(Duration::from_secs(3));
        }
        socket.set_nonblocking(true)?;

        Ok(UdpSender { socket })
    }

    pub fn send(&self, msg: &impl Serialize) -> Result<usize> {
        let buf = rmp_serde::to_vec(msg).context("Failed to encode message")?;
        Ok(self.socket.send(&buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_message_round_trip_over_loopback() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let sender = UdpSender::new(0, receiver.local_addr().unwrap()).unwrap();

        let plate = ArmorPlate {
            distance: 6.5,
            angle_x: -2.0,
            angle_y: 4.25,
            flight_time: 0.24,
            ..ArmorPlate::default()
        };
        let msg = AimMessage::from_plate(&plate, SystemTime::UNIX_EPOCH + Duration::from_secs(10));
        sender.send(&msg).unwrap();

        let mut buf = [0u8; 256];
        let len = receiver.recv(&mut buf).unwrap();
        let decoded: AimMessage = rmp_serde::from_slice(&buf[..len]).unwrap();

        assert_eq!(decoded, msg);
        assert_eq!(decoded.timestamp, 10.);
    }
}
