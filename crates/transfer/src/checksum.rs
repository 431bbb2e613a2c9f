use sftpdir_protocol::{Result, SftpError};
use sftpdir_session::TransportSession;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of a file reachable through `session`.
pub async fn checksum_file(session: &dyn TransportSession, path: &str) -> Result<String> {
    let mut stream = session
        .open_read(path)
        .await
        .map_err(|e| e.with_op("checksum"))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| SftpError::from_io("checksum", path, &e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
