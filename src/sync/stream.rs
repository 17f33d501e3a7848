use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;

use crate::opts::Endpoint;

pub enum Stream {
    Tcp(BufReader<TcpStream>),
    Unix(BufReader<UnixStream>),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(BufReader::new(stream))
    }

    pub fn connect(endpoint: &Endpoint) -> std::io::Result<Self> {
        let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))?;
        tcp.set_nodelay(true)?;
        Ok(Self::tcp(tcp))
    }

    pub fn connect_unix(path: &str) -> std::io::Result<Self> {
        Ok(Self::unix(UnixStream::connect(path)?))
    }

    pub fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().write_all(buf),
            Stream::Unix(r) => r.get_mut().write_all(buf),
        }
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().flush(),
            Stream::Unix(r) => r.get_mut().flush(),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(r) => r.read(buf),
            Stream::Unix(r) => r.read(buf),
        }
    }
}
