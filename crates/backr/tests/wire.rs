//! Raw protocol tests: exact bytes on the wire, including the edges the
//! client library never produces on its own.

mod common;

use backr::BackupOutcome;
use backr::transport::{DEFAULT_TIMEOUT, DatagramClient, LineReader, connect};
use common::*;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

async fn dial(addr: std::net::SocketAddr) -> (LineReader<OwnedReadHalf>, OwnedWriteHalf) {
    let stream = connect(addr, DEFAULT_TIMEOUT).await.unwrap();
    let (read_half, write_half) = stream.into_split();
    (LineReader::new(read_half), write_half)
}

#[test_log::test(tokio::test)]
async fn registration_is_idempotent_in_the_nok_sense() {
    let cs = spawn_cs().await;
    let control = DatagramClient::connect(cs.addr).await.unwrap();

    assert_eq!(
        control.exchange("REG 10.0.0.1 59000\n").await.unwrap(),
        "RGR OK\n"
    );
    assert_eq!(
        control.exchange("REG 10.0.0.1 59000\n").await.unwrap(),
        "RGR NOK\n"
    );
    assert_eq!(
        control.exchange("UNR 10.0.0.1 59000\n").await.unwrap(),
        "UAR OK\n"
    );
    assert_eq!(
        control.exchange("UNR 10.0.0.1 59000\n").await.unwrap(),
        "UAR NOK\n"
    );
    assert_eq!(
        control.exchange("REG 10.0.0.1 notaport\n").await.unwrap(),
        "RGR ERR\n"
    );
    assert_eq!(control.exchange("PING\n").await.unwrap(), "ERR\n");
}

#[test_log::test(tokio::test)]
async fn session_requires_login_and_survives_bad_verbs() {
    let cs = spawn_cs().await;
    let (mut reader, mut writer) = dial(cs.addr).await;

    // Unknown verb, then a verb that needs a login: both ERR, same stream.
    writer.write_all(b"FOO\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "ERR");
    writer.write_all(b"DLU\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "ERR");

    // Malformed credentials are a malformed request, not a refusal.
    writer.write_all(b"AUT bogus pw\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "ERR");

    // The connection is still good for a proper AUT.
    writer.write_all(b"AUT 12345 abcd1234\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "AUR NEW");
}

#[test_log::test(tokio::test)]
async fn empty_dirlist_keeps_its_wire_shape() {
    let cs = spawn_cs().await;
    let (mut reader, mut writer) = dial(cs.addr).await;

    writer.write_all(b"AUT 12345 abcd1234\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "AUR NEW");
    writer.write_all(b"LSD\n").await.unwrap();
    // The empty reply is literally `LDR 0 \n`.
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "LDR 0 ");
}

#[test_log::test(tokio::test)]
async fn unplaced_queries_answer_their_not_found_forms() {
    let cs = spawn_cs().await;

    let (mut reader, mut writer) = dial(cs.addr).await;
    writer.write_all(b"AUT 12345 abcd1234\n").await.unwrap();
    reader.read_token(b"\n").await.unwrap();
    writer.write_all(b"RST nowhere\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "RSR EOF");

    let (mut reader, mut writer) = dial(cs.addr).await;
    writer.write_all(b"AUT 12345 abcd1234\n").await.unwrap();
    reader.read_token(b"\n").await.unwrap();
    writer.write_all(b"LSF nowhere\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "LFD NOK");

    let (mut reader, mut writer) = dial(cs.addr).await;
    writer.write_all(b"AUT 12345 abcd1234\n").await.unwrap();
    reader.read_token(b"\n").await.unwrap();
    writer.write_all(b"DEL nowhere\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "DDR NOK");
}

#[test_log::test(tokio::test)]
async fn bs_session_refuses_unknown_users_and_missing_dirs() {
    let cs = spawn_cs().await;
    let bs = spawn_bs(&cs).await;
    let client = login(&cs, "12345", "abcd1234").await;

    // Provision the user on the BS through a real backup.
    let local = tempfile::tempdir().unwrap();
    let dir = local.path().join("d");
    std::fs::create_dir(&dir).unwrap();
    write_file(&dir, "f", b"abc");
    assert_eq!(
        client.backup(&dir).await.unwrap(),
        BackupOutcome::Uploaded(1)
    );

    // A user the CS never provisioned here is refused.
    let (mut reader, mut writer) = dial(bs.addr).await;
    writer.write_all(b"AUT 99999 abcd1234\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "AUR NOK");

    // The provisioned user gets in, but a directory the BS does not hold
    // ends the restore with EOF.
    let (mut reader, mut writer) = dial(bs.addr).await;
    writer.write_all(b"AUT 12345 abcd1234\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "AUR OK");
    writer.write_all(b"RSB nosuchdir\n").await.unwrap();
    assert_eq!(reader.read_token(b"\n").await.unwrap(), "RBR EOF");
}

#[test_log::test(tokio::test)]
async fn bs_control_answers_through_the_shared_port() {
    let cs = spawn_cs().await;
    let bs = spawn_bs(&cs).await;

    let control = DatagramClient::connect(bs.addr).await.unwrap();
    assert_eq!(
        control.exchange("LSU 12345 abcd1234\n").await.unwrap(),
        "LUR OK\n"
    );
    assert_eq!(
        control.exchange("LSF 12345 photos\n").await.unwrap(),
        "LFD 0\n"
    );
    assert_eq!(
        control.exchange("DLB 12345 photos\n").await.unwrap(),
        "DBR NOK\n"
    );
    // Missing terminator and unknown verbs are both plain ERR.
    assert_eq!(
        control.exchange("LSU 12345 abcd1234").await.unwrap(),
        "ERR\n"
    );
    assert_eq!(control.exchange("PING\n").await.unwrap(), "ERR\n");
}
