//! The session layer: accepting connections, reading lines, writing output.
//!
//! One thread runs a mio poll loop over every connection. Readers never
//! touch the world: a finished line either feeds the tiny login prompt, or
//! lands in the user's bounded input queue for the simulation thread to
//! drain. Output goes the other way through a [`SessionSender`], which any
//! listener may use; writes are serialized per session by the channel and
//! flushed here, outside the world's locks.

use crate::{
  event::Event,
  user::{EnqueueResult, User},
  Game,
};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use lm_common::{id::ConnId, util::ansi};
use mio::{
  event::Event as MioEvent,
  net::{TcpListener, TcpStream},
  Events, Interest, Poll, Token, Waker,
};
use parking_lot::Mutex;
use std::{
  collections::HashMap,
  fmt, io,
  io::{Read, Write},
  net::SocketAddr,
  sync::Arc,
};

const LISTEN: Token = Token(usize::MAX - 1);
const WAKE: Token = Token(usize::MAX);

/// The longest line we accept before dropping the excess.
const MAX_LINE_LEN: usize = 512;

#[derive(Debug, Clone, Copy)]
enum WakeEvent {
  /// Output is waiting for this connection.
  Outbound(Token),
  /// Close this connection after flushing.
  Kick(Token),
}

/// Sends text to one session, from any thread. Cheap to clone.
#[derive(Clone)]
pub struct SessionSender {
  inner: Sink,
}

#[derive(Clone)]
enum Sink {
  Net { tx: Sender<String>, wake: Sender<WakeEvent>, waker: Arc<Waker>, tok: Token },
  /// Collects output in memory; used by tests.
  Capture(Arc<Mutex<Vec<String>>>),
  /// Discards everything.
  Null,
}

impl fmt::Debug for SessionSender {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match &self.inner {
      Sink::Net { tok, .. } => write!(f, "SessionSender({tok:?})"),
      Sink::Capture(_) => write!(f, "SessionSender(capture)"),
      Sink::Null => write!(f, "SessionSender(null)"),
    }
  }
}

impl SessionSender {
  /// Queues raw (already rendered) text for the client. Drops the text if
  /// the client is gone.
  pub fn send(&self, text: String) {
    match &self.inner {
      Sink::Net { tx, wake, waker, tok } => {
        if tx.send(text).is_ok() {
          let _ = wake.send(WakeEvent::Outbound(*tok));
          let _ = waker.wake();
        }
      }
      Sink::Capture(buf) => buf.lock().push(text),
      Sink::Null => {}
    }
  }

  /// Asks the poll loop to flush and close this connection. Used for kicks
  /// from the simulation side.
  pub fn close(&self) {
    if let Sink::Net { wake, waker, tok, .. } = &self.inner {
      let _ = wake.send(WakeEvent::Kick(*tok));
      let _ = waker.wake();
    }
  }

  /// A sender that discards all output.
  pub fn null() -> SessionSender { SessionSender { inner: Sink::Null } }

  /// A sender that captures output for assertions, plus its buffer.
  pub fn capture() -> (SessionSender, Arc<Mutex<Vec<String>>>) {
    let buf = Arc::new(Mutex::new(vec![]));
    (SessionSender { inner: Sink::Capture(buf.clone()) }, buf)
  }
}

/// What the login prompt knows about a connection before a user is bound.
enum ConnState {
  /// Waiting for a name.
  Login,
  /// A `LoginRequest` is in flight or done; input goes to the user queue.
  Bound,
}

struct Connection {
  stream:  TcpStream,
  conn_id: ConnId,
  state:   ConnState,
  closed:  bool,

  tx: Sender<String>,
  rx: Receiver<String>,

  incoming: Vec<u8>,
  outgoing: Vec<u8>,
}

impl Connection {
  fn new(stream: TcpStream, conn_id: ConnId) -> Self {
    let (tx, rx) = crossbeam_channel::bounded(512);
    Connection {
      stream,
      conn_id,
      state: ConnState::Login,
      closed: false,
      tx,
      rx,
      incoming: Vec::with_capacity(1024),
      outgoing: Vec::with_capacity(1024),
    }
  }

  fn sender(&self, wake: &Sender<WakeEvent>, waker: &Arc<Waker>, tok: Token) -> SessionSender {
    SessionSender {
      inner: Sink::Net { tx: self.tx.clone(), wake: wake.clone(), waker: waker.clone(), tok },
    }
  }

  /// Reads whatever is available. Returns completed raw lines; Ok(true)
  /// means the peer is gone.
  fn read(&mut self, buf: &mut [u8]) -> io::Result<(bool, Vec<Vec<u8>>)> {
    let mut lines = vec![];
    loop {
      let n = match self.stream.read(buf) {
        Ok(0) => return Ok((true, lines)),
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok((false, lines)),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => return Err(e),
      };
      self.incoming.extend_from_slice(&buf[..n]);
      while let Some(pos) = self.incoming.iter().position(|&b| b == b'\n') {
        let mut line: Vec<u8> = self.incoming.drain(..=pos).collect();
        line.pop();
        lines.push(line);
      }
      if self.incoming.len() > MAX_LINE_LEN {
        self.incoming.clear();
      }
    }
  }

  fn try_send(&mut self) -> io::Result<()> {
    loop {
      match self.rx.try_recv() {
        Ok(text) => self.outgoing.extend_from_slice(text.as_bytes()),
        Err(TryRecvError::Empty) => break,
        Err(_) => break,
      }
    }
    self.try_flush()
  }

  fn try_flush(&mut self) -> io::Result<()> {
    while !self.outgoing.is_empty() {
      let n = match self.stream.write(&self.outgoing) {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
        Err(e) => return Err(e),
      };
      self.outgoing.drain(0..n);
    }
    Ok(())
  }
}

/// Owns every connection and the poll loop.
pub struct ConnectionManager {
  game:    Game,
  wake_tx: Sender<WakeEvent>,
  wake_rx: Receiver<WakeEvent>,
}

impl ConnectionManager {
  pub fn new(game: Game) -> Self {
    let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
    ConnectionManager { game, wake_tx, wake_rx }
  }

  /// Runs the poll loop until the process exits.
  pub fn run(&mut self, addr: SocketAddr) -> io::Result<()> {
    let mut poll = Poll::new()?;
    let mut listener = TcpListener::bind(addr)?;
    poll.registry().register(&mut listener, LISTEN, Interest::READABLE)?;
    let waker = Arc::new(Waker::new(poll.registry(), WAKE)?);

    let mut connections: HashMap<Token, Connection> = HashMap::new();
    let mut events = Events::with_capacity(1024);
    let mut next_token = 0usize;
    let mut next_conn = 1u64;
    let mut garbage = vec![0; 64 * 1024];

    loop {
      poll.poll(&mut events, None)?;
      for ev in events.iter() {
        match ev.token() {
          LISTEN => loop {
            let (mut stream, _addr) = match listener.accept() {
              Ok(v) => v,
              Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
              Err(e) => return Err(e),
            };
            let tok = Token(next_token);
            next_token += 1;
            poll
              .registry()
              .register(&mut stream, tok, Interest::READABLE | Interest::WRITABLE)?;
            let conn = Connection::new(stream, ConnId(next_conn));
            next_conn += 1;
            let sender = conn.sender(&self.wake_tx, &waker, tok);
            let name = self.game.config.get::<_, String>("server.mud-name");
            sender.send(format!("Welcome to {name}!\r\nWhat is your name? "));
            connections.insert(tok, conn);
          },
          WAKE => {
            while let Ok(wake) = self.wake_rx.try_recv() {
              match wake {
                WakeEvent::Outbound(tok) => {
                  if let Some(conn) = connections.get_mut(&tok) {
                    if conn.try_send().is_err() {
                      conn.closed = true;
                    }
                  }
                }
                WakeEvent::Kick(tok) => {
                  if let Some(conn) = connections.get_mut(&tok) {
                    let _ = conn.try_send();
                    conn.closed = true;
                  }
                }
              }
            }
            Self::sweep_closed(&self.game, &mut connections);
          }
          tok => {
            if let Some(conn) = connections.get_mut(&tok) {
              self.handle_conn_event(conn, ev, &mut garbage, &waker, tok);
            }
            Self::sweep_closed(&self.game, &mut connections);
          }
        }
      }
    }
  }

  fn handle_conn_event(
    &self,
    conn: &mut Connection,
    ev: &MioEvent,
    garbage: &mut [u8],
    waker: &Arc<Waker>,
    tok: Token,
  ) {
    if ev.is_writable() {
      if conn.try_send().is_err() {
        conn.closed = true;
      }
    }
    if ev.is_readable() {
      match conn.read(garbage) {
        Ok((eof, lines)) => {
          for raw in lines {
            let line = ansi::clean_input_line(&raw);
            self.handle_line(conn, line, waker, tok);
          }
          if eof {
            conn.closed = true;
          }
        }
        Err(e) => {
          debug!("read error on {}: {e}", conn.conn_id);
          conn.closed = true;
        }
      }
    }
  }

  /// One cleaned-up line from a client.
  fn handle_line(&self, conn: &mut Connection, line: String, waker: &Arc<Waker>, tok: Token) {
    match conn.state {
      ConnState::Login => {
        let name = line.trim();
        if !User::valid_name(name) {
          conn
            .sender(&self.wake_tx, waker, tok)
            .send("That name won't do. What is your name? ".into());
          return;
        }
        conn.state = ConnState::Bound;
        self.game.bus.enqueue(Event::LoginRequest {
          conn_id: conn.conn_id,
          name:    name.to_string(),
          sender:  conn.sender(&self.wake_tx, waker, tok),
        });
      }
      ConnState::Bound => {
        let user = match self.game.world.user_by_conn(conn.conn_id) {
          Some(u) => u,
          // Login still in flight; drop the line (protocol errors never
          // kill the session).
          None => return,
        };
        let limit = self.game.config.get::<_, usize>("users.input-queue-limit");
        match user.enqueue_input(line, limit) {
          EnqueueResult::Queued => {}
          EnqueueResult::Dropped => {
            user.send_line("You're typing too fast.");
          }
          EnqueueResult::Kick => {
            info!("dropping {} (input flood while idle)", user.name);
            conn.closed = true;
          }
        }
      }
    }
  }

  fn sweep_closed(game: &Game, connections: &mut HashMap<Token, Connection>) {
    connections.retain(|_, conn| {
      if conn.closed {
        game.bus.enqueue(Event::Disconnect { conn_id: conn.conn_id });
      }
      !conn.closed
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn capture_sender_collects() {
    let (sender, buf) = SessionSender::capture();
    sender.send("hello".into());
    sender.send("world".into());
    assert_eq!(*buf.lock(), vec!["hello".to_string(), "world".into()]);
  }
}
