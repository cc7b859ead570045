//! Observation pipeline end to end.
//!
//! Events enter through `submit` or the poll timer and leave through a
//! `ChannelSink`. Poll tests run on a paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use zigsense_core::{CapabilityUpdate, CapabilityValue};
use zigsense_devices::calibration::Evidence;
use zigsense_devices::frame::{cluster, tuya, Datapoint, DatapointValue};
use zigsense_devices::{
    CalibrationConfig, CalibrationEngine, CapabilityRegistry, ChannelSink, Chemistry, DeviceCategory, DeviceError,
    DeviceSpec, InboundEvent, ObservationPipeline, Payload, PipelineConfig, PollTarget, Result,
    Transport,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Transport whose reads return the current scripted value.
struct MockTransport {
    value: Mutex<Option<CapabilityValue>>,
    reads: AtomicUsize,
}

impl MockTransport {
    fn new(value: Option<CapabilityValue>) -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(value),
            reads: AtomicUsize::new(0),
        })
    }

    fn set(&self, value: Option<CapabilityValue>) {
        *self.value.lock() = value;
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read(&self, device_id: &str, target: &PollTarget) -> Result<Payload> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let value = self.value.lock().clone();
        match value {
            Some(value) => Ok(Payload::Attribute {
                attribute_id: target.attribute_id,
                value,
            }),
            None => Err(DeviceError::Transport(format!("{} unreachable", device_id))),
        }
    }
}

fn pipeline(
    transport: Arc<MockTransport>,
    config: PipelineConfig,
) -> (ObservationPipeline, mpsc::Receiver<CapabilityUpdate>) {
    init_tracing();
    let (sink, rx) = ChannelSink::new(128);
    let pipeline = ObservationPipeline::new(
        Arc::new(CapabilityRegistry::builtin().unwrap()),
        Arc::new(CalibrationEngine::new(CalibrationConfig::default())),
        transport,
        Arc::new(sink),
        config,
    );
    (pipeline, rx)
}

fn onoff_report(sequence: u8, on: bool) -> Vec<u8> {
    vec![0x18, sequence, 0x0A, 0x00, 0x00, 0x10, u8::from(on)]
}

async fn expect_none(rx: &mut mpsc::Receiver<CapabilityUpdate>) {
    let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
    assert!(next.is_err(), "unexpected update: {:?}", next);
}

#[tokio::test]
async fn test_push_report_reaches_sink() {
    let (pipeline, mut rx) = pipeline(MockTransport::new(None), PipelineConfig::default());
    pipeline.add_device(DeviceSpec::new("th1")).unwrap();

    let mut frame = vec![0x18, 0x05, 0x0A, 0x00, 0x00, 0x29];
    frame.extend_from_slice(&2150i16.to_le_bytes());
    pipeline
        .submit(InboundEvent::raw("th1", 1, cluster::TEMPERATURE, frame))
        .await
        .unwrap();

    let update = rx.recv().await.unwrap();
    assert_eq!(update.device_id, "th1");
    assert_eq!(update.capability, "measure_temperature");
    assert_eq!(update.value, CapabilityValue::Float(21.5));

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_per_device_order_is_preserved() {
    let (pipeline, mut rx) = pipeline(MockTransport::new(None), PipelineConfig::default());
    pipeline.add_device(DeviceSpec::new("plug")).unwrap();

    let expected: Vec<bool> = (0..40).map(|i| i % 3 == 0).collect();
    for (seq, on) in expected.iter().enumerate() {
        pipeline
            .submit(InboundEvent::raw("plug", 1, cluster::ON_OFF, onoff_report(seq as u8, *on)))
            .await
            .unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..expected.len() {
        let update = rx.recv().await.unwrap();
        received.push(update.value.as_bool().unwrap());
    }
    assert_eq!(received, expected);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_devices_are_isolated() {
    let (pipeline, mut rx) = pipeline(MockTransport::new(None), PipelineConfig::default());
    pipeline
        .add_device(
            DeviceSpec::new("door")
                .with_dialect("sensor")
                .with_category(DeviceCategory::ContactSensor),
        )
        .unwrap();
    pipeline
        .add_device(
            DeviceSpec::new("pir")
                .with_dialect("sensor")
                .with_category(DeviceCategory::MotionSensor),
        )
        .unwrap();

    // Same datapoint, different meaning per device category
    let frame = tuya::encode_datapoints(0, 1, &[Datapoint::new(1, DatapointValue::Bool(true))]);
    pipeline
        .submit(InboundEvent::raw("door", 1, cluster::TUYA_DATAPOINTS, frame.clone()))
        .await
        .unwrap();
    let door = rx.recv().await.unwrap();
    pipeline
        .submit(InboundEvent::raw("pir", 1, cluster::TUYA_DATAPOINTS, frame))
        .await
        .unwrap();
    let pir = rx.recv().await.unwrap();

    assert_eq!((door.device_id.as_str(), door.capability.as_str()), ("door", "alarm_contact"));
    assert_eq!((pir.device_id.as_str(), pir.capability.as_str()), ("pir", "alarm_motion"));
    assert_eq!(door.value, CapabilityValue::Boolean(false));
    assert_eq!(pir.value, CapabilityValue::Boolean(true));
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_battery_learning_through_pipeline() {
    let (pipeline, mut rx) = pipeline(MockTransport::new(None), PipelineConfig::default());
    pipeline
        .add_device(DeviceSpec::new("climate-1").with_manufacturer("_TZE200_bat").with_dialect("climate"))
        .unwrap();

    for _ in 0..5 {
        let event = InboundEvent::new(
            "climate-1",
            1,
            cluster::TUYA_DATAPOINTS,
            Payload::Datapoint {
                index: 4,
                value: DatapointValue::Value(64),
            },
        );
        pipeline.submit(event).await.unwrap();
        let update = rx.recv().await.unwrap();
        assert_eq!(update.capability, "measure_battery");
        assert_eq!(update.value, CapabilityValue::Integer(64));
    }

    let profile = pipeline.calibration().profile("_TZE200_bat").await.unwrap();
    assert!(profile.confirmed);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_battery_voltage_and_current_confirm_physically() {
    let (pipeline, mut rx) = pipeline(MockTransport::new(None), PipelineConfig::default());
    pipeline
        .add_device(
            DeviceSpec::new("door-1")
                .with_manufacturer("_TZ3000_coin")
                .with_dialect("sensor")
                .with_chemistry(Chemistry::Cr2032),
        )
        .unwrap();

    // 2.9 V at 6.6 mA, reported in mV and uA
    let electrical = tuya::encode_datapoints(
        0,
        1,
        &[
            Datapoint::new(106, DatapointValue::Value(2900)),
            Datapoint::new(107, DatapointValue::Value(6600)),
        ],
    );
    pipeline
        .submit(InboundEvent::raw("door-1", 1, cluster::TUYA_DATAPOINTS, electrical))
        .await
        .unwrap();
    assert_eq!(rx.recv().await.unwrap().capability, "measure_voltage");
    assert_eq!(rx.recv().await.unwrap().capability, "measure_current");

    for _ in 0..3 {
        let event = InboundEvent::new(
            "door-1",
            1,
            cluster::TUYA_DATAPOINTS,
            Payload::Datapoint {
                index: 4,
                value: DatapointValue::Value(160),
            },
        );
        pipeline.submit(event).await.unwrap();
        let update = rx.recv().await.unwrap();
        assert_eq!(update.capability, "measure_battery");
        assert_eq!(update.value, CapabilityValue::Integer(80));
    }

    // Three physical samples confirm before statistics could
    let profile = pipeline.calibration().profile("_TZ3000_coin").await.unwrap();
    assert!(profile.confirmed);
    assert_eq!(profile.confirmed_via, Some(Evidence::Physical));
    assert!(profile.voltage_supported && profile.current_supported);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let (pipeline, mut rx) = pipeline(MockTransport::new(None), PipelineConfig::default());
    pipeline.add_device(DeviceSpec::new("d")).unwrap();

    pipeline
        .submit(InboundEvent::raw("d", 1, cluster::TUYA_DATAPOINTS, vec![0x00, 0x01, 0x01, 0x01, 0x00, 0x09, 0x01]))
        .await
        .unwrap();
    pipeline
        .submit(InboundEvent::raw("d", 1, cluster::ON_OFF, onoff_report(1, true)))
        .await
        .unwrap();

    // Only the valid frame produces an update
    let update = rx.recv().await.unwrap();
    assert_eq!(update.capability, "onoff");
    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_emits_only_changes() {
    let transport = MockTransport::new(Some(CapabilityValue::Integer(2150)));
    let (pipeline, mut rx) = pipeline(transport.clone(), PipelineConfig::default());
    pipeline
        .add_device(
            DeviceSpec::new("th1")
                .with_poll_target(PollTarget::new(1, cluster::TEMPERATURE, 0))
                .with_poll_interval_secs(60),
        )
        .unwrap();

    // No read before the first full period
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.reads(), 0);

    let update = rx.recv().await.unwrap();
    assert_eq!(update.value, CapabilityValue::Float(21.5));
    assert_eq!(transport.reads(), 1);

    // Same value on the next tick is not re-emitted
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(transport.reads(), 2);
    expect_none(&mut rx).await;

    // Failed reads keep the baseline and emit nothing
    transport.set(None);
    tokio::time::sleep(Duration::from_secs(60)).await;
    expect_none(&mut rx).await;

    transport.set(Some(CapabilityValue::Integer(2200)));
    let update = rx.recv().await.unwrap();
    assert_eq!(update.value, CapabilityValue::Float(22.0));

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_interval_can_be_cancelled_and_restored() {
    let transport = MockTransport::new(Some(CapabilityValue::Boolean(true)));
    let (pipeline, mut rx) = pipeline(transport.clone(), PipelineConfig::default().with_poll_interval_secs(30));
    pipeline
        .add_device(DeviceSpec::new("plug").with_poll_target(PollTarget::new(1, cluster::ON_OFF, 0)))
        .unwrap();

    rx.recv().await.unwrap();
    pipeline.set_poll_interval("plug", None).unwrap();
    let reads = transport.reads();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.reads(), reads);

    pipeline.set_poll_interval("plug", Some(Duration::from_secs(10))).unwrap();
    transport.set(Some(CapabilityValue::Boolean(false)));
    let update = rx.recv().await.unwrap();
    assert_eq!(update.value, CapabilityValue::Boolean(false));
    assert_eq!(transport.reads(), reads + 1);

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_remove_device_stops_polling() {
    let transport = MockTransport::new(Some(CapabilityValue::Integer(2150)));
    let (pipeline, mut rx) = pipeline(transport.clone(), PipelineConfig::default().with_poll_interval_secs(30));
    pipeline
        .add_device(DeviceSpec::new("th1").with_poll_target(PollTarget::new(1, cluster::TEMPERATURE, 0)))
        .unwrap();
    rx.recv().await.unwrap();

    pipeline.remove_device("th1").await.unwrap();
    let reads = transport.reads();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(transport.reads(), reads);

    let err = pipeline
        .submit(InboundEvent::raw("th1", 1, cluster::ON_OFF, onoff_report(0, true)))
        .await
        .unwrap_err();
    assert!(matches!(err, DeviceError::NotFound(_)));
}
