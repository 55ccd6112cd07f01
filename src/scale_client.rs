//! BLE transport for the scale: discovery, connection and the session
//! driver that pumps notification frames through the [`SessionConsumer`].

use anyhow::anyhow;
use bluest::Adapter;
use bluest::AdvertisingDevice;
use bluest::Characteristic;
use bluest::Device;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio::time::Duration;

use crate::config::{Config, UserProfile};
use crate::session::{SessionConsumer, SessionInput, Step, CMD_ACK_END};
use crate::uploader::UploadSink;

pub struct ScaleClient {
    adapter: Adapter,
    device: Device,
    history: Characteristic,
}

impl ScaleClient {
    /// How long to scan before giving up on finding the scale
    const DISCOVERY_TIMEOUT_S: u64 = 30;
    /// How long to wait for notifications to come up after subscribing
    const SUBSCRIBE_TIMEOUT_S: u64 = 10;
    /// How long the consumer waits for the next frame before declaring the
    /// device unresponsive and aborting the session
    const FRAME_TIMEOUT_S: u64 = 30;
    /// Queue depth between the notification pump and the consumer. Frames
    /// arrive slower than they are consumed, so a small bound suffices.
    const FRAME_QUEUE_DEPTH: usize = 32;

    /// Create a new `ScaleClient`, which includes attempting to discover
    /// the device.
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let adapter = bluest::Adapter::default()
            .await
            .ok_or(anyhow!("Default adapter not found"))?;
        adapter.wait_available().await?;

        let device = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            Self::discover_device(config, &adapter),
        )
        .await
        .map_err(|_| anyhow!("Device not found"))??;

        adapter.connect_device(&device.device).await?;

        let service = device
            .device
            .discover_services_with_uuid(config.service_uuid)
            .await?
            .first()
            .ok_or(anyhow!(
                "The specified device does not expose the body composition service."
            ))?
            .clone();
        let history = service
            .discover_characteristics_with_uuid(config.history_characteristic_uuid)
            .await?
            .first()
            .ok_or(anyhow!(
                "The specified device does not expose the history characteristic."
            ))?
            .clone();

        Ok(Self {
            adapter: adapter.clone(),
            device: device.device,
            history,
        })
    }

    /// Disconnect from the scale
    pub async fn stop(self) -> anyhow::Result<()> {
        self.adapter.disconnect_device(&self.device).await?;
        Ok(())
    }

    /// Run one full history session: enable notifications, request the
    /// stored record count, drain the records, upload each one, and
    /// acknowledge the end of the history. Returns the number of records
    /// successfully uploaded.
    ///
    /// Transport errors abort the session; upload and decode failures are
    /// logged and the session continues.
    pub async fn run_session(
        &mut self,
        profile: &UserProfile,
        sink: &UploadSink,
    ) -> anyhow::Result<usize> {
        self.try_connect().await?;

        let (frame_tx, mut frame_rx) = mpsc::channel(Self::FRAME_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = oneshot::channel();

        // The notification stream borrows the characteristic, so the pump
        // task owns a clone of it for the lifetime of the session.
        let history = self.history.clone();
        let pump = tokio::spawn(async move {
            let mut notifications = match history.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            while let Some(event) = notifications.next().await {
                let input = match event {
                    Ok(frame) => {
                        log::debug!("RX frame: {}", hex::encode(&frame));
                        SessionInput::Frame(frame)
                    }
                    Err(err) => {
                        log::warn!("notification error: {err}");
                        SessionInput::Shutdown
                    }
                };
                let stop = input == SessionInput::Shutdown;
                if frame_tx.send(input).await.is_err() || stop {
                    return;
                }
            }
            let _ = frame_tx.send(SessionInput::Shutdown).await;
        });

        let result = self
            .drive_session(profile, sink, &mut frame_rx, ready_rx)
            .await;

        pump.abort();

        result
    }

    async fn drive_session(
        &mut self,
        profile: &UserProfile,
        sink: &UploadSink,
        frame_rx: &mut mpsc::Receiver<SessionInput>,
        ready_rx: oneshot::Receiver<Result<(), bluest::Error>>,
    ) -> anyhow::Result<usize> {
        timeout(Duration::from_secs(Self::SUBSCRIBE_TIMEOUT_S), ready_rx)
            .await
            .map_err(|_| anyhow!("timed out enabling notifications"))?
            .map_err(|_| anyhow!("notification pump stopped before subscribing"))??;

        let mut consumer = SessionConsumer::new(*profile);
        self.write(consumer.start()).await?;

        let mut uploaded = 0;
        loop {
            let input = timeout(Duration::from_secs(Self::FRAME_TIMEOUT_S), frame_rx.recv())
                .await
                .map_err(|_| anyhow!("device stopped responding mid-session"))?
                // Channel closed means the pump is gone, same as a shutdown
                .unwrap_or(SessionInput::Shutdown);

            match consumer.on_input(input) {
                Step::Continue => {}
                Step::Write(command) => self.write(command).await?,
                Step::Publish(record) => {
                    log::info!(
                        "record {}: {:.2}kg, {} ohm, {:.1}% fat",
                        record.datetime,
                        record.weight_kg,
                        record.impedance,
                        record.fat_percentage
                    );
                    match sink.upload(&record).await {
                        Ok(()) => uploaded += 1,
                        Err(err) => log::warn!("upload failed, record lost: {err}"),
                    }
                }
                Step::Close { ack } => {
                    if ack {
                        self.write(&CMD_ACK_END).await?;
                        consumer.finish();
                    }
                    return Ok(uploaded);
                }
            }
        }
    }

    async fn write(&self, command: &[u8]) -> anyhow::Result<()> {
        log::debug!("TX command: {}", hex::encode(command));
        self.history.write(command).await?;
        Ok(())
    }

    async fn discover_device(
        config: &Config,
        adapter: &Adapter,
    ) -> anyhow::Result<AdvertisingDevice> {
        let required_services = [config.service_uuid];
        let mut adapter_events = adapter.scan(&required_services).await?;
        while let Some(device) = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            adapter_events.next(),
        )
        .await
        .map_err(|_| anyhow!("Device not found"))?
        {
            let device_name = device.device.name_async().await?;
            if device_name == config.device_name {
                return Ok(device);
            }
        }

        Err(anyhow!("Device not found"))
    }

    async fn try_connect(&self) -> anyhow::Result<()> {
        if !self.device.is_connected().await {
            let mut retries = 2;
            loop {
                match self.adapter.connect_device(&self.device).await {
                    Ok(()) => return Ok(()),
                    Err(err) if retries > 0 => {
                        log::warn!("failed to connect: {err}");
                        retries -= 1;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        Ok(())
    }
}
