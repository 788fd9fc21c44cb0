//! A scripted single-connection peer for driving the client against
//! controlled protocol exchanges, without a real remote implementation.
//!
//! The peer owns a listening socket and a runner thread: accept one
//! connection, then read whatever chunks the transport hands over and feed
//! them to a [`FrameParser`], which reassembles frames across chunk
//! boundaries and checks them against the test script. The test thread
//! injects scripted response bytes with [`TestPeer::send_bytes`] and, after
//! stopping the peer, polls [`TestPeer::take_error`] for any failure that
//! happened on the runner thread while the test was busy elsewhere.

use crate::errors::*;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, trace};
use snafu::{OptionExt, ResultExt};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{Builder, JoinHandle};

/// Incremental frame decoder driven by the peer's read loop.
///
/// Implementations are responsible for reassembling frames across arbitrary
/// chunk boundaries; `input` is called with whatever the transport delivered,
/// which may be part of a frame or several frames at once.
pub trait FrameParser: Send + 'static {
    /// Prime the parser to expect the protocol header as the next decodable
    /// unit.
    fn expect_header(&mut self);

    /// Feed raw bytes read off the wire. Resumable across calls.
    fn input(&mut self, bytes: &[u8]) -> Result<()>;
}

struct Shared {
    parser: Mutex<Box<dyn FrameParser>>,
    // Write half of the accepted socket. Written once by the runner thread,
    // read by send_bytes/stop callers on other threads.
    client: Mutex<Option<TcpStream>>,
    stopping: AtomicBool,
}

/// A test peer serving exactly one connection.
///
/// Multiple concurrent connections are not supported; a second client is
/// never accepted.
pub struct TestPeer {
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    error_rx: Receiver<Error>,
    join_handle: Option<JoinHandle<()>>,
}

impl Drop for TestPeer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl TestPeer {
    /// Bind to `port` (0 picks an ephemeral port - see
    /// [`local_addr`](TestPeer::local_addr)) and start the runner thread.
    pub fn start<P: FrameParser>(port: u16, parser: P) -> Result<TestPeer> {
        let listener = TcpListener::bind(("127.0.0.1", port)).context(IoSnafu)?;
        let local_addr = listener.local_addr().context(IoSnafu)?;
        debug!("test peer listening on {}", local_addr);

        let shared = Arc::new(Shared {
            parser: Mutex::new(Box::new(parser)),
            client: Mutex::new(None),
            stopping: AtomicBool::new(false),
        });
        let (error_tx, error_rx) = bounded(1);

        let runner_shared = Arc::clone(&shared);
        let join_handle = Builder::new()
            .name("amqgate-testpeer".to_string())
            .spawn(move || run(listener, runner_shared, error_tx))
            .context(ForkSnafu)?;

        Ok(TestPeer {
            local_addr,
            shared,
            error_rx,
            join_handle: Some(join_handle),
        })
    }

    /// The address the peer is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Prime the frame parser to expect the protocol header.
    pub fn expect_header(&self) {
        self.shared.parser.lock().unwrap().expect_header();
    }

    /// Write `bytes` to the connected client and flush.
    ///
    /// Fails with [`Error::PeerNotConnected`] if no client has connected yet;
    /// that is a test-script ordering bug, not a condition worth retrying.
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        debug!("sending {} bytes", bytes.len());
        let client = self.shared.client.lock().unwrap();
        let mut stream = client.as_ref().context(PeerNotConnectedSnafu)?;
        stream.write_all(bytes).context(IoSnafu)?;
        stream.flush().context(IoSnafu)
    }

    /// Shut the peer down and reap the runner thread. Safe to call from any
    /// thread, including while the runner is parked in accept or read.
    ///
    /// Failures provoked by this shutdown are suppressed, so a stopped peer
    /// reports an empty [`take_error`](TestPeer::take_error).
    pub fn stop(&mut self) -> Result<()> {
        // Raise the flag before waking the runner: any connection that
        // arrives from here on is discarded, so nothing can sneak in while
        // we tear down.
        self.shared.stopping.store(true, Ordering::SeqCst);

        // Unblock a pending accept. The runner drops the listener on exit.
        let _ = TcpStream::connect(self.local_addr);

        // Unblock a pending read.
        if let Some(client) = self.shared.client.lock().unwrap().as_ref() {
            let _ = client.shutdown(Shutdown::Both);
        }

        let join_handle = match self.join_handle.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        join_handle.join().map_err(|err| {
            IoThreadPanicSnafu {
                message: format!("{:?}", err),
            }
            .build()
        })
    }

    /// Take the error captured on the runner thread, if any.
    ///
    /// Only populated by abnormal failure of the accept/read loop; poll it
    /// after [`stop`](TestPeer::stop) to fail the test on problems that
    /// happened while the test thread was elsewhere.
    pub fn take_error(&self) -> Option<Error> {
        self.error_rx.try_recv().ok()
    }
}

fn run(listener: TcpListener, shared: Arc<Shared>, error_tx: Sender<Error>) {
    if let Err(err) = serve(listener, &shared) {
        if shared.stopping.load(Ordering::SeqCst) {
            debug!("ignoring error during shutdown: {}", err);
        } else {
            error!("problem in test peer: {}", err);
            let _ = error_tx.send(err);
        }
    }
}

// The listener is owned here, so every exit path - clean end-of-stream,
// parser failure, I/O error - closes it.
fn serve(listener: TcpListener, shared: &Shared) -> Result<()> {
    let (mut stream, client_addr) = listener.accept().context(IoSnafu)?;
    if shared.stopping.load(Ordering::SeqCst) {
        return Ok(());
    }
    debug!("accepted connection from {}", client_addr);

    let writer = stream.try_clone().context(IoSnafu)?;
    *shared.client.lock().unwrap() = Some(writer);

    let mut chunk = [0u8; 1024];
    loop {
        trace!("attempting read");
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => return Err(err).context(IoSnafu),
        };
        trace!("read {} bytes", n);
        shared.parser.lock().unwrap().input(&chunk[..n])?;
    }
    debug!("exited read loop");
    Ok(())
}
