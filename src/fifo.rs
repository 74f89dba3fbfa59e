//! The time-ordered client queue.
//!
//! **Invariant:** `send_next` is non-decreasing from head to tail. This
//! holds by construction: every insertion (new accept or re-enqueue after a
//! successful write) sets `send_next = now + delay` with `now`
//! non-decreasing and `delay` constant within an iteration, and everything
//! already in the queue was scheduled at an earlier `now`. A single head
//! check therefore always gives the next wake time, and the drip phase
//! never needs to scan past the head to find due clients.
//!
//! `remove_by_fd` from the original design is intentionally not implemented:
//! the drip phase always services from the head, so nothing ever needs to
//! be pulled out of the middle of the queue.

use std::collections::VecDeque;

use crate::client::Client;

pub(crate) struct Fifo {
    clients: VecDeque<Client>,
}

impl Fifo {
    pub(crate) fn new() -> Self {
        Self {
            clients: VecDeque::new(),
        }
    }

    pub(crate) fn append(&mut self, client: Client) {
        self.clients.push_back(client);
    }

    pub(crate) fn pop(&mut self) -> Option<Client> {
        self.clients.pop_front()
    }

    pub(crate) fn peek(&self) -> Option<&Client> {
        self.clients.front()
    }

    pub(crate) fn len(&self) -> usize {
        self.clients.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    /// Close every enrolled client's socket and drop it, in head-to-tail
    /// order, as at shutdown.
    pub(crate) fn destroy(&mut self) -> Vec<Client> {
        self.clients.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{SocketAddr, TcpListener};
    use std::time::{Duration, Instant};

    fn dummy_client(send_next: Instant) -> Client {
        // A loopback pair gives us a real, already-connected socket without
        // touching the actual tarpit listener.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client_side = std::net::TcpStream::connect(addr).unwrap();
        let (server_side, peer) = listener.accept().unwrap();
        let _ = peer;
        server_side.set_nonblocking(true).unwrap();
        let stream = mio::net::TcpStream::from_std(server_side);
        let peer: SocketAddr = client_side.local_addr().unwrap();
        let now = Instant::now();
        Client::new(stream, peer, now, send_next)
    }

    #[test]
    fn fifo_is_first_in_first_out() {
        let mut fifo = Fifo::new();
        let now = Instant::now();
        fifo.append(dummy_client(now));
        fifo.append(dummy_client(now + Duration::from_millis(10)));
        assert_eq!(fifo.len(), 2);
        let first = fifo.pop().unwrap();
        let second = fifo.pop().unwrap();
        assert!(first.send_next <= second.send_next);
        assert!(fifo.is_empty());
    }

    #[test]
    fn destroy_drains_everything() {
        let mut fifo = Fifo::new();
        let now = Instant::now();
        for i in 0..5 {
            fifo.append(dummy_client(now + Duration::from_millis(i)));
        }
        let drained = fifo.destroy();
        assert_eq!(drained.len(), 5);
        assert!(fifo.is_empty());
    }
}
