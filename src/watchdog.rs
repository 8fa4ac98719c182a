//! systemd readiness/watchdog notification over `NOTIFY_SOCKET`. Honors
//! abstract socket paths (leading `@`, mapped to a leading NUL byte). A
//! no-op when `NOTIFY_SOCKET` is unset so the binary runs identically
//! outside systemd.

use std::os::unix::net::UnixDatagram;

pub struct Watchdog {
    socket: Option<UnixDatagramTarget>,
}

struct UnixDatagramTarget {
    socket: UnixDatagram,
    path: Vec<u8>,
}

impl Watchdog {
    pub fn from_env() -> Self {
        let socket = std::env::var("NOTIFY_SOCKET").ok().and_then(|raw| {
            let path = if let Some(stripped) = raw.strip_prefix('@') {
                let mut bytes = vec![0u8];
                bytes.extend_from_slice(stripped.as_bytes());
                bytes
            } else {
                raw.into_bytes()
            };

            UnixDatagram::unbound().ok().map(|socket| UnixDatagramTarget { socket, path })
        });
        Self { socket }
    }

    fn send(&self, message: &str) {
        use std::os::unix::net::SocketAddr;
        use std::os::linux::net::SocketAddrExt;

        if let Some(target) = &self.socket {
            let addr = if target.path.first() == Some(&0) {
                SocketAddrExt::from_abstract_name(&target.path[1..])
            } else {
                SocketAddr::from_pathname(std::str::from_utf8(&target.path).unwrap_or_default())
            };
            if let Ok(addr) = addr {
                let _ = target.socket.send_to_addr(message.as_bytes(), &addr);
            }
        }
    }

    pub fn ready(&self) {
        self.send("READY=1");
    }

    pub fn ping(&self) {
        self.send("WATCHDOG=1");
    }
}
