//! Client-side core verbs, invoked by the thin interactive shell.
//!
//! Every verb dials a fresh CS session and re-authenticates, because the
//! CS closes the stream after each terminating verb. Backup and restore
//! then open a second stream straight to the owning BS for the bytes.

use crate::cs::BsAddr;
use crate::{Error, fsutil};
use backr_proto::{FileInfo, Password, ProtoError, Username, filemeta};
use backr_transport::{DEFAULT_TIMEOUT, LineReader, connect};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Most files a single directory may hold to be eligible for backup.
pub const MAX_DIR_FILES: usize = 20;

/// Outcome of [`Client::login`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// The username was free and has been registered (`AUR NEW`).
    New,
    /// Credentials matched (`AUR OK`).
    Ok,
    /// The password did not match (`AUR NOK`).
    Rejected,
}

/// Outcome of [`Client::backup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// `BKR EOF`: no backup server is registered.
    NoServers,
    /// The CS asked for zero files; nothing was transferred.
    UpToDate,
    /// This many files were uploaded and acknowledged.
    Uploaded(usize),
    /// The BS answered the upload with `UPR NOK`.
    Refused,
}

/// Outcome of [`Client::restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// `RSR EOF`: the directory was never backed up.
    NotPlaced,
    /// `RBR EOF`: the owning BS no longer holds the directory.
    MissingOnServer,
    /// This many files were written locally.
    Restored(usize),
}

/// Outcome of [`Client::filelist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileListOutcome {
    /// `LFD NOK`: the directory was never backed up.
    NotPlaced,
    /// The listing, with the BS that holds it.
    Files {
        host: String,
        port: u16,
        files: Vec<FileInfo>,
    },
}

type CsConnection = (LineReader<OwnedReadHalf>, OwnedWriteHalf);

/// A user's view of the system: the CS address plus the credentials of the
/// current login, if any.
pub struct Client {
    cs_host: String,
    cs_port: u16,
    creds: Option<(Username, Password)>,
}

impl Client {
    pub fn new(cs_host: impl Into<String>, cs_port: u16) -> Self {
        Self {
            cs_host: cs_host.into(),
            cs_port,
            creds: None,
        }
    }

    pub fn logged_in(&self) -> bool {
        self.creds.is_some()
    }

    /// Forgets the current credentials. Returns whether any were held.
    pub fn logout(&mut self) -> bool {
        self.creds.take().is_some()
    }

    /// Authenticates against the CS, registering the username if it is
    /// free. Credentials are validated locally first.
    pub async fn login(&mut self, user: &str, pass: &str) -> crate::Result<LoginStatus> {
        let user: Username = user.parse()?;
        let pass: Password = pass.parse()?;

        let (mut reader, mut writer) = self.dial_cs().await?;
        let status = send_aut(&mut reader, &mut writer, &user, &pass).await?;
        let outcome = match status.as_str() {
            "NEW" => LoginStatus::New,
            "OK" => LoginStatus::Ok,
            "NOK" => LoginStatus::Rejected,
            _ => {
                return Err(ProtoError::UnexpectedReply {
                    expected: "AUR",
                    got: status,
                }
                .into());
            }
        };
        if outcome != LoginStatus::Rejected {
            self.creds = Some((user, pass));
        }
        Ok(outcome)
    }

    /// Deletes the logged-in user at the CS. Refused while any directory
    /// of the user is still backed up.
    pub async fn deluser(&mut self) -> crate::Result<bool> {
        let (mut reader, mut writer) = self.authenticated_cs().await?;
        writer.write_all(b"DLU\n").await?;
        let reply = reader.read_token(b"\n").await?;
        match reply.as_str() {
            "DLR OK" => {
                self.creds = None;
                Ok(true)
            }
            "DLR NOK" => Ok(false),
            _ => Err(ProtoError::UnexpectedReply {
                expected: "DLR",
                got: reply,
            }
            .into()),
        }
    }

    /// Backs up the local directory `dir`, uploading whatever subset the
    /// CS asks for.
    pub async fn backup(&self, dir: &Path) -> crate::Result<BackupOutcome> {
        let (user, pass) = self.creds()?;
        let dirname = dir_component(dir)?;
        let files = fsutil::list_files(dir)?;
        if files.len() > MAX_DIR_FILES {
            return Err(Error::TooManyFiles {
                found: files.len(),
                cap: MAX_DIR_FILES,
            });
        }

        let (mut reader, mut writer) = self.authenticated_cs().await?;
        let mut request = format!("BCK {} {}", dirname, files.len());
        filemeta::push_entries(&mut request, &files);
        request.push('\n');
        writer.write_all(request.as_bytes()).await?;

        let verb = reader.read_token(b" \n").await?;
        if verb != "BKR" {
            return Err(ProtoError::UnexpectedReply {
                expected: "BKR",
                got: verb,
            }
            .into());
        }
        let host = reader.read_token(b" \n").await?;
        if host == "EOF" {
            return Ok(BackupOutcome::NoServers);
        }
        let port: u16 = reader
            .read_token(b" ")
            .await?
            .parse()
            .map_err(|_| ProtoError::Malformed("port"))?;
        let count: usize = reader
            .read_token(b" \n")
            .await?
            .parse()
            .map_err(|_| ProtoError::Malformed("file count"))?;
        if count == 0 {
            log::info!("{dirname}: nothing to upload");
            return Ok(BackupOutcome::UpToDate);
        }
        let rest = reader.read_token(b"\n").await?;
        let wanted = filemeta::parse_entries(count, &mut rest.split_whitespace())?;
        drop((reader, writer));

        // Upload the local bytes of every file the CS named.
        let to_send: Vec<&FileInfo> = files
            .iter()
            .filter(|f| wanted.iter().any(|w| w.name == f.name))
            .collect();
        log::info!(
            "{dirname}: uploading {} file(s) to {host}:{port}",
            to_send.len()
        );

        let bs = BsAddr {
            host,
            port,
        };
        let (mut reader, mut writer) = self.authenticated_bs(&bs, user, pass).await?;
        writer
            .write_all(format!("UPL {} {}", dirname, to_send.len()).as_bytes())
            .await?;
        for file in &to_send {
            writer.write_all(format!(" {file} ").as_bytes()).await?;
            fsutil::send_file(&mut writer, &dir.join(&file.name), file.size).await?;
        }
        writer.write_all(b"\n").await?;

        let reply = reader.read_token(b"\n").await?;
        match reply.as_str() {
            "UPR OK" => Ok(BackupOutcome::Uploaded(to_send.len())),
            "UPR NOK" => Ok(BackupOutcome::Refused),
            _ => Err(ProtoError::UnexpectedReply {
                expected: "UPR",
                got: reply,
            }
            .into()),
        }
    }

    /// Restores the backed-up directory `dirname` into `dest`.
    pub async fn restore(&self, dirname: &str, dest: &Path) -> crate::Result<RestoreOutcome> {
        let (user, pass) = self.creds()?;

        let (mut reader, mut writer) = self.authenticated_cs().await?;
        writer.write_all(format!("RST {dirname}\n").as_bytes()).await?;
        let verb = reader.read_token(b" \n").await?;
        if verb != "RSR" {
            return Err(ProtoError::UnexpectedReply {
                expected: "RSR",
                got: verb,
            }
            .into());
        }
        let host = reader.read_token(b" \n").await?;
        if host == "EOF" {
            return Ok(RestoreOutcome::NotPlaced);
        }
        let port: u16 = reader
            .read_token(b"\n")
            .await?
            .parse()
            .map_err(|_| ProtoError::Malformed("port"))?;
        drop((reader, writer));

        let bs = BsAddr { host, port };
        let (mut reader, mut writer) = self.authenticated_bs(&bs, user, pass).await?;
        writer.write_all(format!("RSB {dirname}\n").as_bytes()).await?;

        let verb = reader.read_token(b" \n").await?;
        if verb != "RBR" {
            return Err(ProtoError::UnexpectedReply {
                expected: "RBR",
                got: verb,
            }
            .into());
        }
        let count_token = reader.read_token(b" \n").await?;
        if count_token == "EOF" {
            return Ok(RestoreOutcome::MissingOnServer);
        }
        let count: usize = count_token
            .parse()
            .map_err(|_| ProtoError::Malformed("file count"))?;
        if count == 0 {
            return Ok(RestoreOutcome::Restored(0));
        }

        tokio::fs::create_dir_all(dest).await?;
        for received in 0..count {
            let name = reader.read_token(b" ").await?;
            let date = reader.read_token(b" ").await?;
            let hms = reader.read_token(b" ").await?;
            let size: u64 = reader
                .read_token(b" ")
                .await?
                .parse()
                .map_err(|_| ProtoError::Malformed("file size"))?;
            let mtime = filemeta::parse_mtime(&date, &hms)?;
            if !fsutil::is_safe_component(&name) {
                return Err(ProtoError::Malformed("file name").into());
            }

            log::info!("restoring {name} ({size} bytes)");
            if !fsutil::receive_file(&mut reader, &dest.join(&name), size, mtime.into()).await? {
                return Err(Error::SizeMismatch(name));
            }
            if received + 1 < count {
                match reader.read_byte().await? {
                    b' ' => {}
                    _ => return Err(ProtoError::Malformed("file separator").into()),
                }
            }
        }
        Ok(RestoreOutcome::Restored(count))
    }

    /// Lists the user's backed-up directories.
    pub async fn dirlist(&self) -> crate::Result<Vec<String>> {
        let (mut reader, mut writer) = self.authenticated_cs().await?;
        writer.write_all(b"LSD\n").await?;

        let verb = reader.read_token(b" \n").await?;
        if verb != "LDR" {
            return Err(ProtoError::UnexpectedReply {
                expected: "LDR",
                got: verb,
            }
            .into());
        }
        let count: usize = reader
            .read_token(b" \n")
            .await?
            .parse()
            .map_err(|_| ProtoError::Malformed("directory count"))?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let rest = reader.read_token(b"\n").await?;
        let dirs: Vec<String> = rest.split_whitespace().map(str::to_owned).collect();
        if dirs.len() != count {
            return Err(ProtoError::BadCount.into());
        }
        Ok(dirs)
    }

    /// Lists the files of one backed-up directory, straight from the CS.
    pub async fn filelist(&self, dirname: &str) -> crate::Result<FileListOutcome> {
        let (mut reader, mut writer) = self.authenticated_cs().await?;
        writer.write_all(format!("LSF {dirname}\n").as_bytes()).await?;

        let verb = reader.read_token(b" \n").await?;
        if verb != "LFD" {
            return Err(ProtoError::UnexpectedReply {
                expected: "LFD",
                got: verb,
            }
            .into());
        }
        let host = reader.read_token(b" \n").await?;
        if host == "NOK" {
            return Ok(FileListOutcome::NotPlaced);
        }
        let port: u16 = reader
            .read_token(b" ")
            .await?
            .parse()
            .map_err(|_| ProtoError::Malformed("port"))?;
        let count: usize = reader
            .read_token(b" \n")
            .await?
            .parse()
            .map_err(|_| ProtoError::Malformed("file count"))?;
        let files = if count > 0 {
            let rest = reader.read_token(b"\n").await?;
            filemeta::parse_entries(count, &mut rest.split_whitespace())?
        } else {
            Vec::new()
        };
        Ok(FileListOutcome::Files { host, port, files })
    }

    /// Deletes one backed-up directory.
    pub async fn delete(&self, dirname: &str) -> crate::Result<bool> {
        let (mut reader, mut writer) = self.authenticated_cs().await?;
        writer.write_all(format!("DEL {dirname}\n").as_bytes()).await?;
        let reply = reader.read_token(b"\n").await?;
        match reply.as_str() {
            "DDR OK" => Ok(true),
            "DDR NOK" => Ok(false),
            _ => Err(ProtoError::UnexpectedReply {
                expected: "DDR",
                got: reply,
            }
            .into()),
        }
    }

    fn creds(&self) -> crate::Result<&(Username, Password)> {
        self.creds.as_ref().ok_or(Error::NotLoggedIn)
    }

    async fn dial_cs(&self) -> crate::Result<CsConnection> {
        let stream = connect((self.cs_host.as_str(), self.cs_port), DEFAULT_TIMEOUT).await?;
        let (read_half, write_half) = stream.into_split();
        Ok((LineReader::new(read_half), write_half))
    }

    /// Fresh CS connection with a completed `AUT`; `AUR NOK` is fatal.
    async fn authenticated_cs(&self) -> crate::Result<CsConnection> {
        let (user, pass) = self.creds()?;
        let (mut reader, mut writer) = self.dial_cs().await?;
        let status = send_aut(&mut reader, &mut writer, user, pass).await?;
        match status.as_str() {
            "OK" | "NEW" => Ok((reader, writer)),
            _ => Err(Error::AuthRefused),
        }
    }

    /// Fresh BS connection with a completed `AUT`; only `AUR OK` passes.
    async fn authenticated_bs(
        &self,
        bs: &BsAddr,
        user: &Username,
        pass: &Password,
    ) -> crate::Result<CsConnection> {
        let stream = connect(bs.target(), DEFAULT_TIMEOUT).await?;
        let (read_half, write_half) = stream.into_split();
        let mut reader = LineReader::new(read_half);
        let mut writer = write_half;
        let status = send_aut(&mut reader, &mut writer, user, pass).await?;
        match status.as_str() {
            "OK" => Ok((reader, writer)),
            _ => Err(Error::AuthRefused),
        }
    }
}

/// Sends `AUT` and returns the bare status token of the `AUR` reply.
async fn send_aut(
    reader: &mut LineReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    user: &Username,
    pass: &Password,
) -> crate::Result<String> {
    writer
        .write_all(format!("AUT {user} {pass}\n").as_bytes())
        .await?;
    let verb = reader.read_token(b" ").await?;
    if verb != "AUR" {
        return Err(ProtoError::UnexpectedReply {
            expected: "AUR",
            got: verb,
        }
        .into());
    }
    Ok(reader.read_token(b"\n").await?)
}

/// The final component of the directory path, as announced on the wire.
fn dir_component(dir: &Path) -> crate::Result<String> {
    dir.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| fsutil::is_safe_component(name))
        .map(str::to_owned)
        .ok_or_else(|| ProtoError::Malformed("directory name").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_component_takes_the_final_segment() {
        assert_eq!(dir_component(Path::new("photos")).unwrap(), "photos");
        assert_eq!(dir_component(Path::new("/tmp/x/photos")).unwrap(), "photos");
        assert!(dir_component(Path::new("/")).is_err());
    }

    #[test]
    fn logout_reports_prior_state() {
        let mut client = Client::new("127.0.0.1", 1);
        assert!(!client.logout());
        client.creds = Some(("12345".parse().unwrap(), "abcd1234".parse().unwrap()));
        assert!(client.logout());
        assert!(!client.logged_in());
    }
}
