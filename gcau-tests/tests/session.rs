use std::time::Duration;

use gcau_client::{FramedChannel, SessionState, WriteChunks, session::Builder};
use gcau_config::{Attribute, ClassRestrictions, PatchFile, PatchFileKind, PatchObject};
use gcau_tests::SimulatedController;
use spg_protocol::{FrameError, MAX_COMMAND_LEN};
use tokio::io::{DuplexStream, duplex};
use tokio::task::JoinHandle;

fn connect(
    controller: SimulatedController,
) -> (FramedChannel<DuplexStream>, JoinHandle<SimulatedController>) {
    let (host, device) = duplex(4096);
    let served = tokio::spawn(controller.serve(device));
    (FramedChannel::new(host), served)
}

fn patch(lines: &[&str]) -> PatchFile {
    PatchFile::from_lines(
        "patch.agcp0",
        PatchFileKind::Decoded,
        lines.iter().map(|l| l.to_string()).collect(),
        false,
    )
    .unwrap()
}

#[tokio::test]
async fn login_and_write_patch() {
    let (channel, served) = connect(SimulatedController::default());
    let mut session = Builder::new().slave_number(Some(3)).build(channel);
    assert!(session.login().await);

    let patch = patch(&[
        "[Description]",
        "Pressure limits",
        "[Data]",
        "ANIX_1.!STATUS = \"OK\"",
        "ANIX_1.LIMIT = \"12.5\"",
        "ANIX_1.UNIT = \"bar/s\"",
        "SYSTEM.NAME = \"Plant_1: north\"",
    ]);
    let report = session.write_patch(patch.patch_objects()).await;
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.written, 2);
    assert_eq!(session.state(), &SessionState::Done);

    drop(session);
    let controller = served.await.unwrap();
    let anix = &controller.objects["ANIX_1"];
    assert_eq!(anix.get(&1), None);
    assert_eq!(anix[&2], "12.5");
    assert_eq!(anix[&3], "bar/s");
    assert_eq!(controller.objects["SYSTEM"][&1], "Plant_1: north");
    assert!(
        controller
            .requests
            .iter()
            .any(|r| r.starts_with("@3&1/WCFG/ANIX_1/2:12.5/3:bar\\/s"))
    );
}

#[tokio::test]
async fn long_objects_are_written_in_chunks() {
    let (channel, served) = connect(SimulatedController::default());
    let mut session = Builder::new().build(channel);
    assert!(session.login().await);

    let attributes = (1..=15)
        .map(|p| {
            let value = format!("text number {}", p);
            Attribute::new(format!("TEXT{}", p), p, Some(value), false)
        })
        .collect();
    let object = PatchObject::new("DISPLAY_1", attributes, 15);
    let of = WriteChunks::new(&object, "WCFG", None, Some(1)).len();
    assert!(of >= 2);
    assert_eq!(session.write_object(&object).await, FrameError::Ok);
    assert_eq!(session.state(), &SessionState::Done);

    drop(session);
    let controller = served.await.unwrap();
    let writes: Vec<&String> = controller
        .requests
        .iter()
        .filter(|r| r.contains("/WCFG/"))
        .collect();
    assert_eq!(writes.len(), of);
    for write in writes {
        assert!(write.starts_with("@&1/WCFG/DISPLAY_1/"));
        // The request is recorded without its CR
        assert!(write.len() < MAX_COMMAND_LEN);
    }
    let stored = &controller.objects["DISPLAY_1"];
    assert_eq!(stored.len(), 15);
    assert_eq!(stored[&15], "text number 15");
}

#[tokio::test]
async fn writes_require_login() {
    let (channel, _served) = connect(SimulatedController::default());
    let mut session = Builder::new().build(channel);
    let object = PatchObject::new(
        "ANIX_1",
        vec![Attribute::new("LIMIT", 1, Some("1".into()), false)],
        1,
    );
    assert_eq!(session.write_object(&object).await, FrameError::RepliedNotLogged);
    assert_eq!(
        session.state(),
        &SessionState::Failed(FrameError::RepliedNotLogged)
    );
}

#[tokio::test]
async fn rejected_object_fails_session() {
    let controller = SimulatedController {
        unknown_objects: vec!["ANIX_1".to_owned()],
        ..Default::default()
    };
    let (channel, _served) = connect(controller);
    let mut session = Builder::new().build(channel);
    assert!(session.login().await);
    let object = PatchObject::new(
        "ANIX_1",
        vec![Attribute::new("LIMIT", 1, Some("1".into()), false)],
        1,
    );
    assert_eq!(
        session.write_object(&object).await,
        FrameError::RepliedUnknownObject
    );
    assert_eq!(
        session.state(),
        &SessionState::Failed(FrameError::RepliedUnknownObject)
    );
}

#[tokio::test]
async fn login_rejects_unanswerable_challenge() {
    let controller = SimulatedController {
        challenge: "9999".to_owned(),
        ..Default::default()
    };
    let (channel, _served) = connect(controller);
    let mut session = Builder::new().build(channel);
    assert!(!session.login().await);
    assert!(matches!(session.state(), SessionState::Failed(_)));
}

#[tokio::test]
async fn unknown_object_stops_patch() {
    let controller = SimulatedController {
        unknown_objects: vec!["ANIX_2".to_owned()],
        ..Default::default()
    };
    let (channel, served) = connect(controller);
    let mut session = Builder::new().build(channel);
    assert!(session.login().await);

    let patch = patch(&[
        "[Description]",
        "[Data]",
        "ANIX_1.LIMIT = \"1\"",
        "ANIX_2.LIMIT = \"2\"",
        "ANIX_3.LIMIT = \"3\"",
    ]);
    let report = session.write_patch(patch.patch_objects()).await;
    assert_eq!(report.written, 1);
    let failure = report.failure.unwrap();
    assert_eq!(failure.object, "ANIX_2");
    assert_eq!(failure.error, FrameError::RepliedUnknownObject);

    drop(session);
    let controller = served.await.unwrap();
    assert!(!controller.objects.contains_key("ANIX_3"));
}

#[tokio::test]
async fn wrong_verb_in_reply_fails_write() {
    let controller = SimulatedController {
        reply_verb: Some("RCFG".to_owned()),
        ..Default::default()
    };
    let (channel, _served) = connect(controller);
    let mut session = Builder::new().build(channel);
    assert!(session.login().await);
    let object = PatchObject::new(
        "ANIX_1",
        vec![Attribute::new("LIMIT", 1, Some("1".into()), false)],
        1,
    );
    assert_eq!(session.write_object(&object).await, FrameError::WrongVerbInReply);
}

#[tokio::test(start_paused = true)]
async fn silent_controller_times_out() {
    let (host, _device) = duplex(4096);
    let mut session = Builder::new()
        .reply_timeout(Duration::from_millis(500))
        .build(FramedChannel::new(host));
    assert!(!session.login().await);
    assert_eq!(session.state(), &SessionState::Failed(FrameError::Timeout));
}

#[tokio::test]
async fn restricted_patch_honours_controller_classes() {
    let controller = SimulatedController::default();
    let mut restrictions = ClassRestrictions::from_yaml_str(
        "maxClasses: 12\n---\nANIX:\n  - { minClasses: 0, instances: 2, cfgAttributes: 1 }\n",
        "classes.yaml",
    )
    .unwrap();
    assert!(restrictions.resolve(controller.object_schema));

    let (channel, served) = connect(controller);
    let mut session = Builder::new().build(channel);
    assert!(session.login().await);
    let patch = patch(&[
        "[Description]",
        "[Data]",
        "ANIX_1.LIMIT = \"1\"",
        "ANIX_1.UNIT = \"bar\"",
        "ANIX_3.LIMIT = \"3\"",
    ]);
    let objects = patch.restricted_patch_objects(&restrictions);
    let report = session.write_patch(&objects).await;
    assert_eq!(report.written, 1);

    drop(session);
    let controller = served.await.unwrap();
    assert_eq!(controller.objects.len(), 1);
    assert_eq!(controller.objects["ANIX_1"].len(), 1);
}
