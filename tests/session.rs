use color_eyre::Result;
use pretty_assertions::assert_eq;
use serial_bridge::{config::DEFAULT_BAUD, error::Error, events::SessionEvent, mock};

mod common;
use common::{next_event, start_session};

#[tokio::test]
async fn send_before_open_is_not_open() -> Result<()> {
    let session = start_session();

    let result = session.send("too early").await;

    assert_eq!(result, Err(Error::NotOpen));
    Ok(())
}

#[tokio::test]
async fn status_reflects_lifecycle() -> Result<()> {
    let device = mock::install("status-lifecycle");
    let session = start_session();

    let status = session.status().await;
    assert!(!status.open);
    assert_eq!(status.path, None);

    session.open(device.path(), DEFAULT_BAUD).await?;

    let status = session.status().await;
    assert!(status.open);
    assert_eq!(status.path.as_deref(), Some(device.path()));

    session.close().await;

    let status = session.status().await;
    assert!(!status.open);
    assert_eq!(status.path, None);

    Ok(())
}

#[tokio::test]
async fn device_lines_reach_subscribers_and_partials_are_dropped() -> Result<()> {
    let mut device = mock::install("chunked-lines");
    let session = start_session();
    let mut rx = session.subscribe();

    session.open(device.path(), DEFAULT_BAUD).await?;
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Open);

    // "A\r\nB\nC" over three arbitrary chunk boundaries.
    device.emit_bytes(b"A\r").await?;
    device.emit_bytes(b"\nB\n").await?;
    device.emit_bytes(b"C").await?;

    assert_eq!(next_event(&mut rx).await?, SessionEvent::Data("A".into()));
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Data("B".into()));

    // "C" never got its delimiter; closing discards it.
    session.close().await;
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Close);
    assert!(rx.try_recv().is_err());

    Ok(())
}

#[tokio::test]
async fn sent_lines_reach_the_device() -> Result<()> {
    let mut device = mock::install("host-to-device");
    let session = start_session();

    session.open(device.path(), DEFAULT_BAUD).await?;

    session.send("step 100").await?;
    session.send("step -5").await?;

    assert_eq!(device.next_written_line().await?, "step 100");
    assert_eq!(device.next_written_line().await?, "step -5");

    Ok(())
}

#[tokio::test]
async fn open_while_open_closes_first() -> Result<()> {
    let first = mock::install("reopen-first");
    let second = mock::install("reopen-second");

    let session = start_session();
    let mut rx = session.subscribe();

    session.open(first.path(), DEFAULT_BAUD).await?;
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Open);

    session.open(second.path(), DEFAULT_BAUD).await?;

    // Exactly one close (for the implicit teardown), then one open.
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Close);
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Open);
    assert!(rx.try_recv().is_err());

    assert_eq!(session.status().await.path.as_deref(), Some(second.path()));

    Ok(())
}

#[tokio::test]
async fn close_when_already_closed_still_emits_close() -> Result<()> {
    let session = start_session();
    let mut rx = session.subscribe();

    session.close().await;
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Close);

    session.close().await;
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Close);

    Ok(())
}

#[tokio::test]
async fn opening_a_missing_device_fails_and_leaves_idle() -> Result<()> {
    let session = start_session();
    let mut rx = session.subscribe();

    let result = session.open("mock:never-installed", DEFAULT_BAUD).await;

    assert_eq!(
        result,
        Err(Error::DeviceNotFound("mock:never-installed".into()))
    );
    assert!(matches!(next_event(&mut rx).await?, SessionEvent::Error(_)));

    let status = session.status().await;
    assert!(!status.open);

    Ok(())
}

#[tokio::test]
async fn device_removal_publishes_error_then_close() -> Result<()> {
    let device = mock::install("unplugged");
    let session = start_session();
    let mut rx = session.subscribe();

    session.open(device.path(), DEFAULT_BAUD).await?;
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Open);

    // Unplug.
    drop(device);

    assert!(matches!(next_event(&mut rx).await?, SessionEvent::Error(_)));
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Close);

    let status = session.status().await;
    assert!(!status.open);

    assert_eq!(session.send("anyone there?").await, Err(Error::NotOpen));

    Ok(())
}

#[tokio::test]
async fn unsubscribed_receivers_get_nothing_while_others_continue() -> Result<()> {
    let device = mock::install("unsubscribe");
    let session = start_session();

    let dropped = session.subscribe();
    let mut kept = session.subscribe();

    drop(dropped);

    session.open(device.path(), DEFAULT_BAUD).await?;
    assert_eq!(next_event(&mut kept).await?, SessionEvent::Open);

    Ok(())
}

#[tokio::test]
async fn subscriptions_survive_open_close_cycles() -> Result<()> {
    let first = mock::install("cycle-first");
    let second = mock::install("cycle-second");

    let session = start_session();
    let mut rx = session.subscribe();

    session.open(first.path(), DEFAULT_BAUD).await?;
    session.close().await;
    session.open(second.path(), DEFAULT_BAUD).await?;

    assert_eq!(next_event(&mut rx).await?, SessionEvent::Open);
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Close);
    assert_eq!(next_event(&mut rx).await?, SessionEvent::Open);

    Ok(())
}
