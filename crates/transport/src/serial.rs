//! Serial transport over the MicroPython raw REPL.
//!
//! Each operation is one command exchange: enter raw mode, execute a
//! small device-side Python snippet, collect its output and error
//! streams, leave raw mode. The port handling itself belongs to the
//! `serialport` crate; this module only speaks the command protocol.

use std::io::{self, Read, Write};

use tracing::{debug, trace};

use crate::{SerialSettings, Transport, TransportError, validate_remote_path};

const CTRL_A: u8 = 0x01; // enter raw REPL
const CTRL_B: u8 = 0x02; // exit raw REPL
const CTRL_C: u8 = 0x03; // keyboard interrupt
const CTRL_D: u8 = 0x04; // end of command / soft reboot

/// Prompt printed by the board on entering raw REPL mode.
const RAW_REPL_PROMPT: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";

/// Bytes of file data sent per `f.write` exchange. Hex encoding doubles
/// this on the wire; raw-REPL input buffers on small boards are tight.
const PUT_CHUNK_SIZE: usize = 256;

/// Byte channel beneath the raw-REPL exchange.
///
/// The production implementation is a serial port; tests script one in
/// memory.
trait RawChannel: Read + Write {
    /// Drops any bytes the device has already sent.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl RawChannel for Box<dyn serialport::SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }
}

/// Serial channel to a MicroPython board.
pub struct SerialTransport {
    channel: Box<dyn RawChannel>,
    settings: SerialSettings,
}

impl SerialTransport {
    /// Opens the serial port at `device`.
    pub fn connect(device: &str, settings: SerialSettings) -> Result<Self, TransportError> {
        let port = serialport::new(device, settings.baud_rate)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| map_open_error(device, e))?;

        debug!(device, baud = settings.baud_rate, "serial port open");
        Ok(Self::over(Box::new(port), settings))
    }

    /// Wraps an open channel, waiting out the settle delay so
    /// boot-time chatter does not swallow the first command.
    fn over(channel: Box<dyn RawChannel>, settings: SerialSettings) -> Self {
        std::thread::sleep(settings.settle_delay);
        Self { channel, settings }
    }

    /// Executes `command` in a fresh raw-REPL session and returns its
    /// stdout bytes.
    fn exec(&mut self, command: &str) -> Result<Vec<u8>, TransportError> {
        self.enter_raw_repl()?;
        let result = self.exec_in_raw(command);
        // Leave raw mode even when the command failed so the board is
        // usable for the next operation.
        let _ = self.write_all(&[b'\r', CTRL_B]);
        result
    }

    /// Sends one command inside an already-entered raw-REPL session.
    ///
    /// Wire format: command bytes, Ctrl-D, then `OK`, stdout, Ctrl-D,
    /// stderr, Ctrl-D, `>` from the board.
    fn exec_in_raw(&mut self, command: &str) -> Result<Vec<u8>, TransportError> {
        trace!(command, "raw REPL exec");
        self.write_all(command.as_bytes())?;
        self.write_all(&[CTRL_D])?;

        let mut ack = [0u8; 2];
        self.read_exact(&mut ack)?;
        if &ack != b"OK" {
            return Err(TransportError::Channel(format!(
                "unexpected raw REPL acknowledgement: {:?}",
                String::from_utf8_lossy(&ack)
            )));
        }

        let output = self.read_until_byte(CTRL_D)?;
        let error = self.read_until_byte(CTRL_D)?;
        // Trailing prompt before the board accepts the next command.
        let _ = self.read_byte()?;

        if !error.is_empty() {
            return Err(map_device_error(&error));
        }
        Ok(output)
    }

    fn enter_raw_repl(&mut self) -> Result<(), TransportError> {
        // Interrupt whatever is running, then drop its output.
        self.write_all(&[b'\r', CTRL_C, CTRL_C])?;
        std::thread::sleep(std::time::Duration::from_millis(100));
        self.channel
            .discard_input()
            .map_err(|_| TransportError::ConnectionLost)?;

        self.write_all(&[b'\r', CTRL_A])?;
        self.read_until(RAW_REPL_PROMPT)?;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.channel
            .write_all(data)
            .map_err(|_| TransportError::ConnectionLost)?;
        self.channel
            .flush()
            .map_err(|_| TransportError::ConnectionLost)
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.channel.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => {
                TransportError::Channel("timed out waiting for device".into())
            }
            _ => TransportError::ConnectionLost,
        })
    }

    /// Reads until `marker` appears; returns the bytes before it.
    fn read_until(&mut self, marker: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut buf = Vec::new();
        loop {
            buf.push(self.read_byte()?);
            if buf.ends_with(marker) {
                buf.truncate(buf.len() - marker.len());
                return Ok(buf);
            }
        }
    }

    fn read_until_byte(&mut self, marker: u8) -> Result<Vec<u8>, TransportError> {
        self.read_until(&[marker])
    }
}

impl Transport for SerialTransport {
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), TransportError> {
        validate_remote_path(path)?;
        self.enter_raw_repl()?;
        let result: Result<(), TransportError> = (|| {
            self.exec_in_raw(&format!(
                "import ubinascii\nf = open('{}', 'wb')",
                py_str(path)
            ))?;
            for chunk in data.chunks(PUT_CHUNK_SIZE) {
                self.exec_in_raw(&format!(
                    "f.write(ubinascii.unhexlify('{}'))",
                    hex::encode(chunk)
                ))?;
            }
            self.exec_in_raw("f.close()")?;
            Ok(())
        })();
        if result.is_err() {
            // Best effort: do not leave the device-side handle open.
            let _ = self.exec_in_raw("f.close()");
        }
        let _ = self.write_all(&[b'\r', CTRL_B]);
        result
    }

    fn mkdir(&mut self, path: &str) -> Result<(), TransportError> {
        validate_remote_path(path)?;
        self.exec(&format!("import os\nos.mkdir('{}')", py_str(path)))?;
        Ok(())
    }

    fn stat_size(&mut self, path: &str) -> Result<u64, TransportError> {
        validate_remote_path(path)?;
        let out = self.exec(&format!(
            "import os\nprint(os.stat('{}')[6])",
            py_str(path)
        ))?;
        let text = String::from_utf8_lossy(&out);
        text.trim().parse().map_err(|_| {
            TransportError::Channel(format!("unparseable stat output: {:?}", text.trim()))
        })
    }

    fn hash(&mut self, path: &str) -> Result<String, TransportError> {
        validate_remote_path(path)?;
        let command = format!(
            "import sys\n\
             import ubinascii\n\
             from uhashlib import sha1\n\
             h = sha1()\n\
             f = open('{}', 'rb')\n\
             while True:\n\
             \x20   data = f.read({})\n\
             \x20   if not data:\n\
             \x20       break\n\
             \x20   h.update(data)\n\
             f.close()\n\
             sys.stdout.write(ubinascii.hexlify(h.digest()))",
            py_str(path),
            self.settings.hash_chunk_size
        );
        let out = self.exec(&command)?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        debug!("soft reset");
        self.write_all(&[CTRL_C, CTRL_D])
    }
}

/// Escapes a path for inclusion in a single-quoted Python literal.
fn py_str(path: &str) -> String {
    path.replace('\\', "\\\\").replace('\'', "\\'")
}

fn map_open_error(device: &str, err: serialport::Error) -> TransportError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => TransportError::DeviceAbsent(device.into()),
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            TransportError::PermissionDenied(device.into())
        }
        serialport::ErrorKind::Io(io::ErrorKind::ResourceBusy) => {
            TransportError::DeviceBusy(device.into())
        }
        _ => TransportError::Channel(format!("{device}: {err}")),
    }
}

/// Maps the board's error stream onto the transport taxonomy.
///
/// MicroPython reports missing files as `OSError: [Errno 2] ENOENT`
/// and pre-existing directories as `OSError: [Errno 17] EEXIST`.
fn map_device_error(stderr: &[u8]) -> TransportError {
    let text = String::from_utf8_lossy(stderr);
    let message = text.trim().to_string();
    if text.contains("ENOENT") || text.contains("Errno 2]") {
        TransportError::NotFound(message)
    } else if text.contains("EEXIST") || text.contains("Errno 17]") {
        TransportError::AlreadyExists(message)
    } else {
        TransportError::Channel(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    /// Scripted byte channel: reads come from a pre-recorded device
    /// script, writes are captured for inspection.
    struct FakePort {
        script: VecDeque<u8>,
        written: Rc<RefCell<Vec<u8>>>,
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "script exhausted")),
            }
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl RawChannel for FakePort {
        fn discard_input(&mut self) -> io::Result<()> {
            // The script holds the device's future responses, not
            // stale boot chatter; nothing to drop.
            Ok(())
        }
    }

    /// One raw-REPL session: the entry prompt, then one framed
    /// response per executed command.
    fn session(responses: &[(&[u8], &[u8])]) -> VecDeque<u8> {
        let mut script = Vec::new();
        script.extend_from_slice(RAW_REPL_PROMPT);
        for (stdout, stderr) in responses {
            script.extend_from_slice(b"OK");
            script.extend_from_slice(stdout);
            script.push(CTRL_D);
            script.extend_from_slice(stderr);
            script.push(CTRL_D);
            script.push(b'>');
        }
        script.into()
    }

    fn transport_with(
        script: VecDeque<u8>,
        settings: SerialSettings,
    ) -> (SerialTransport, Rc<RefCell<Vec<u8>>>) {
        let written = Rc::new(RefCell::new(Vec::new()));
        let port = FakePort {
            script,
            written: Rc::clone(&written),
        };
        (SerialTransport::over(Box::new(port), settings), written)
    }

    fn transport(script: VecDeque<u8>) -> (SerialTransport, Rc<RefCell<Vec<u8>>>) {
        transport_with(
            script,
            SerialSettings {
                settle_delay: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    fn sent_text(written: &Rc<RefCell<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&written.borrow()).into_owned()
    }

    #[test]
    fn stat_size_round_trip() {
        let (mut t, written) = transport(session(&[(b"123", b"")]));
        assert_eq!(t.stat_size("main.py").unwrap(), 123);
        assert!(sent_text(&written).contains("os.stat('main.py')[6]"));
    }

    #[test]
    fn stat_size_missing_file_maps_to_not_found() {
        let (mut t, _) = transport(session(&[(b"", b"OSError: [Errno 2] ENOENT\r\n")]));
        assert!(matches!(
            t.stat_size("gone.py"),
            Err(TransportError::NotFound(_))
        ));
    }

    #[test]
    fn mkdir_existing_dir_maps_to_already_exists() {
        let (mut t, _) = transport(session(&[(b"", b"OSError: [Errno 17] EEXIST\r\n")]));
        assert!(matches!(
            t.mkdir("lib"),
            Err(TransportError::AlreadyExists(_))
        ));
    }

    #[test]
    fn hash_round_trip_uses_configured_chunk_size() {
        let settings = SerialSettings {
            settle_delay: Duration::ZERO,
            hash_chunk_size: 64,
            ..Default::default()
        };
        let (mut t, written) =
            transport_with(session(&[(b"a9993e364706816aba3e25717850c26c9cd0d89d", b"")]), settings);

        let digest = t.hash("main.py").unwrap();
        assert_eq!(digest, "a9993e364706816aba3e25717850c26c9cd0d89d");

        let sent = sent_text(&written);
        assert!(sent.contains("f.read(64)"));
        assert!(sent.contains("uhashlib"));
    }

    #[test]
    fn put_sends_hex_chunks_and_closes() {
        // open, one data chunk, close.
        let (mut t, written) = transport(session(&[(b"", b""), (b"", b""), (b"", b"")]));
        t.put("main.py", b"abc").unwrap();

        let sent = sent_text(&written);
        assert!(sent.contains("open('main.py', 'wb')"));
        assert!(sent.contains(&hex::encode(b"abc")));
        assert!(sent.contains("unhexlify"));
        assert!(sent.contains("f.close()"));
    }

    #[test]
    fn put_splits_large_files_into_chunks() {
        let data = vec![b'A'; PUT_CHUNK_SIZE + 1];
        // open, two chunk writes, close.
        let (mut t, written) =
            transport(session(&[(b"", b""), (b"", b""), (b"", b""), (b"", b"")]));
        t.put("big.bin", &data).unwrap();

        assert_eq!(sent_text(&written).matches("unhexlify").count(), 2);
    }

    #[test]
    fn failed_put_still_closes_the_device_handle() {
        // open succeeds, the chunk write fails, the close on the error
        // path consumes the final response.
        let (mut t, written) = transport(session(&[
            (b"", b""),
            (b"", b"OSError: [Errno 28] ENOSPC\r\n"),
            (b"", b""),
        ]));

        let result = t.put("main.py", b"abc");
        assert!(matches!(result, Err(TransportError::Channel(_))));
        assert!(sent_text(&written).contains("f.close()"));
    }

    #[test]
    fn reset_writes_interrupt_then_eof() {
        let (mut t, written) = transport(VecDeque::new());
        t.reset().unwrap();
        assert_eq!(*written.borrow(), vec![CTRL_C, CTRL_D]);
    }

    #[test]
    fn settle_delay_is_honored_before_first_command() {
        let settings = SerialSettings {
            settle_delay: Duration::from_millis(50),
            ..Default::default()
        };
        let started = Instant::now();
        let (_t, _written) = transport_with(VecDeque::new(), settings);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn garbage_acknowledgement_is_a_channel_error() {
        let mut script: VecDeque<u8> = RAW_REPL_PROMPT.to_vec().into();
        script.extend(b"NO");
        let (mut t, _) = transport(script);
        assert!(matches!(
            t.stat_size("x.py"),
            Err(TransportError::Channel(_))
        ));
    }

    #[test]
    fn py_str_escapes_quotes() {
        assert_eq!(py_str("it's.py"), "it\\'s.py");
        assert_eq!(py_str("plain/path.py"), "plain/path.py");
    }

    #[test]
    fn device_enoent_maps_to_not_found() {
        let err = map_device_error(
            b"Traceback (most recent call last):\r\nOSError: [Errno 2] ENOENT\r\n",
        );
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[test]
    fn other_device_errors_map_to_channel() {
        let err = map_device_error(b"NameError: name 'os' isn't defined\r\n");
        assert!(matches!(err, TransportError::Channel(_)));
    }

    #[test]
    fn open_error_no_device_maps_to_absent() {
        let err = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
        assert!(matches!(
            map_open_error("/dev/ttyUSB0", err),
            TransportError::DeviceAbsent(_)
        ));
    }

    #[test]
    fn open_error_permission_maps_to_denied() {
        let err = serialport::Error::new(
            serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied),
            "no",
        );
        assert!(matches!(
            map_open_error("/dev/ttyUSB0", err),
            TransportError::PermissionDenied(_)
        ));
    }
}
