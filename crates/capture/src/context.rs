//! Chunk execution context
//!
//! One context captures everything a single chunk run produces: console
//! text goes to the chunk's console log, images and widgets are moved
//! into the chunk cache, and once both the console and the image capture
//! have finished, completion is announced exactly once.
//!
//! Every signal the context reacts to (console events, artifact events and
//! watch callbacks) is forwarded into one inbox and handled in order by a
//! single task, so handlers never run concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use events::{
    ConsoleEvents, ConsoleOutput, EventSource, Notification, NotificationBus, OutputEvents,
    SubscriptionHandle,
};
use notebook_core::{ChannelType, ChunkId, ChunkKey, DocumentId, OutputType};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cache::{CachedOutput, ChunkCache};
use crate::completion::{CompletionState, FinishSignal};
use crate::config::CaptureConfig;
use crate::engine::GraphicsEngine;
use crate::error::{CaptureError, Result};
use crate::monitor::ImageCaptureMonitor;
use crate::naming::ArtifactNaming;
use crate::recorder::ConsoleRecorder;
use crate::watch::{DirectoryWatchService, WatchEvent, WatchSink};
use crate::widgets::WidgetCapture;
use crate::writer::ArtifactWriter;

/// Host collaborators shared by every chunk session.
#[derive(Clone)]
pub struct CaptureServices {
    pub engine: Arc<dyn GraphicsEngine>,
    pub watcher: Arc<dyn DirectoryWatchService>,
    pub widgets: Arc<dyn WidgetCapture>,
    pub bus: NotificationBus,
}

#[derive(Debug)]
enum Inbox {
    Prompt(String),
    ConsoleOutput(ConsoleOutput),
    ConsoleInput(String),
    ImageReady(PathBuf),
    ImageCaptureComplete,
    WidgetReady(PathBuf),
    Watch(WatchEvent),
    Cancel,
}

/// Ends a running chunk capture early.
///
/// The session still closes the device, drains pending images and
/// announces completion through its normal path.
#[derive(Clone)]
pub struct CancelHandle(mpsc::UnboundedSender<Inbox>);

impl CancelHandle {
    /// Returns false when the session has already finished.
    pub fn cancel(&self) -> bool {
        self.0.send(Inbox::Cancel).is_ok()
    }
}

#[derive(Debug, Default)]
struct Subscriptions {
    prompt: Option<SubscriptionHandle>,
    output: Option<SubscriptionHandle>,
    input: Option<SubscriptionHandle>,
    image_ready: Option<SubscriptionHandle>,
    image_complete: Option<SubscriptionHandle>,
    widget_ready: Option<SubscriptionHandle>,
}

fn release<E>(source: &EventSource<E>, slot: &mut Option<SubscriptionHandle>) {
    if let Some(handle) = slot.take() {
        source.unsubscribe(handle);
    }
}

fn forward<E, F>(tx: &mpsc::UnboundedSender<Inbox>, wrap: F) -> impl Fn(&E) + Send + Sync + 'static
where
    E: 'static,
    F: Fn(&E) -> Inbox + Send + Sync + 'static,
{
    let tx = tx.clone();
    move |event: &E| {
        // The receiver only goes away with the context itself
        let _ = tx.send(wrap(event));
    }
}

pub struct ChunkExecContext {
    key: ChunkKey,
    context_id: String,
    cache: ChunkCache,
    console: ConsoleEvents,
    outputs: OutputEvents,
    bus: NotificationBus,
    widgets: Arc<dyn WidgetCapture>,
    monitor: ImageCaptureMonitor,
    writer: ArtifactWriter,
    recorder: ConsoleRecorder,
    state: CompletionState,
    subs: Subscriptions,
    tx: mpsc::UnboundedSender<Inbox>,
    inbox: mpsc::UnboundedReceiver<Inbox>,
}

impl ChunkExecContext {
    pub fn new(
        key: ChunkKey,
        config: &CaptureConfig,
        console: ConsoleEvents,
        services: CaptureServices,
    ) -> Result<Self> {
        let cache = ChunkCache::new(&config.cache_root);
        let naming = ArtifactNaming::new(&config.naming)?;
        let outputs = OutputEvents::new();
        let monitor = ImageCaptureMonitor::new(
            naming,
            config.device.clone(),
            services.engine,
            services.watcher,
            outputs.clone(),
        )
        .with_dedupe_drain(config.dedupe_drain);
        let writer = ArtifactWriter::new(key.clone(), cache.clone());
        let recorder = ConsoleRecorder::new(cache.console_log(&key));
        let (tx, inbox) = mpsc::unbounded_channel();

        Ok(Self {
            key,
            context_id: config.context_id.clone(),
            cache,
            console,
            outputs,
            bus: services.bus,
            widgets: services.widgets,
            monitor,
            writer,
            recorder,
            state: CompletionState::Idle,
            subs: Subscriptions::default(),
            tx,
            inbox,
        })
    }

    pub fn key(&self) -> &ChunkKey {
        &self.key
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.key.document_id
    }

    pub fn chunk_id(&self) -> &ChunkId {
        &self.key.chunk_id
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    pub fn console_connected(&self) -> bool {
        self.state.console_connected()
    }

    pub fn images_connected(&self) -> bool {
        self.state.images_connected()
    }

    /// Artifact sources of this chunk; producers emit on them.
    pub fn outputs(&self) -> &OutputEvents {
        &self.outputs
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.tx.clone())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.cache.chunk_dir(&self.key)
    }

    /// Artifacts cached for this chunk so far, in ordinal order.
    pub fn cached_outputs(&self) -> Result<Vec<CachedOutput>> {
        self.cache.outputs(&self.key)
    }

    /// Begin capturing.
    ///
    /// If the output directory cannot be created nothing is subscribed,
    /// completion is announced right away and the error is returned.
    /// A device or watch failure only disables image capture.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != CompletionState::Idle {
            warn!(chunk = %self.key, state = ?self.state, "Chunk context already connected");
            return Ok(());
        }

        let output_dir = self.output_dir();
        if let Err(e) = std::fs::create_dir_all(&output_dir) {
            error!(
                chunk = %self.key,
                dir = %output_dir.display(),
                error = %e,
                "Failed to create chunk output directory"
            );
            self.state = CompletionState::Completed;
            self.announce_completed();
            return Err(CaptureError::output_directory(output_dir, e));
        }

        self.subs.prompt = Some(
            self.console
                .prompt
                .subscribe(forward(&self.tx, |p: &String| Inbox::Prompt(p.clone()))),
        );
        self.subs.output = Some(self.console.output.subscribe(forward(
            &self.tx,
            |o: &ConsoleOutput| Inbox::ConsoleOutput(o.clone()),
        )));
        self.subs.input = Some(
            self.console
                .input
                .subscribe(forward(&self.tx, |t: &String| Inbox::ConsoleInput(t.clone()))),
        );

        self.subs.image_ready = Some(
            self.outputs
                .image_ready
                .subscribe(forward(&self.tx, |p: &PathBuf| Inbox::ImageReady(p.clone()))),
        );
        self.subs.image_complete = Some(
            self.outputs
                .image_capture_complete
                .subscribe(forward(&self.tx, |_: &()| Inbox::ImageCaptureComplete)),
        );

        let images_started = match self.monitor.start(&output_dir, self.watch_sink()).await {
            Ok(()) => true,
            Err(e) => {
                error!(chunk = %self.key, error = %e, "Failed to start image capture");
                release(&self.outputs.image_ready, &mut self.subs.image_ready);
                release(&self.outputs.image_capture_complete, &mut self.subs.image_complete);
                false
            }
        };

        self.subs.widget_ready = Some(
            self.outputs
                .widget_ready
                .subscribe(forward(&self.tx, |p: &PathBuf| Inbox::WidgetReady(p.clone()))),
        );
        let lib_dir = self.cache.shared_lib_dir(&self.key.document_id);
        if let Err(e) = self
            .widgets
            .begin(&output_dir, &lib_dir, self.outputs.widget_ready.clone())
        {
            error!(chunk = %self.key, error = %e, "Failed to start widget capture");
        }

        self.state = CompletionState::connected(images_started);
        info!(chunk = %self.key, images = images_started, "Chunk capture connected");
        Ok(())
    }

    /// Stop listening to the console and widgets.
    pub fn disconnect(&mut self) {
        release(&self.console.prompt, &mut self.subs.prompt);
        release(&self.console.output, &mut self.subs.output);
        release(&self.console.input, &mut self.subs.input);
        release(&self.outputs.widget_ready, &mut self.subs.widget_ready);
        self.finish(FinishSignal::Console);
    }

    /// Handle queued signals until the chunk completes.
    pub async fn run(mut self) {
        while !self.state.is_completed() {
            let Some(message) = self.inbox.recv().await else {
                break;
            };
            self.dispatch(message).await;
        }
        debug!(chunk = %self.key, "Chunk context finished");
    }

    /// Handle every signal queued so far, including ones queued while
    /// handling. Returns how many were handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox.try_recv() {
            self.dispatch(message).await;
            handled += 1;
        }
        handled
    }

    async fn dispatch(&mut self, message: Inbox) {
        match message {
            Inbox::Prompt(_) => {
                if self.subs.prompt.is_none() {
                    return;
                }
                debug!(chunk = %self.key, "Console prompt, chunk finished executing");
                self.disconnect();
                self.monitor.stop().await;
            }
            Inbox::ConsoleOutput(output) => {
                if self.subs.output.is_some() {
                    self.on_console_text(output.kind.into(), &output.text);
                }
            }
            Inbox::ConsoleInput(text) => {
                if self.subs.input.is_some() {
                    self.on_console_text(ChannelType::Input, &text);
                }
            }
            Inbox::ImageReady(path) => {
                if self.subs.image_ready.is_some() {
                    self.on_file_output(&path, OutputType::Plot);
                }
            }
            Inbox::ImageCaptureComplete => {
                if self.subs.image_complete.is_none() {
                    return;
                }
                release(&self.outputs.image_ready, &mut self.subs.image_ready);
                release(&self.outputs.image_capture_complete, &mut self.subs.image_complete);
                self.finish(FinishSignal::Images);
            }
            Inbox::WidgetReady(path) => {
                if self.subs.widget_ready.is_some() {
                    self.on_file_output(&path, OutputType::Html);
                }
            }
            Inbox::Watch(event) => self.monitor.handle_watch_event(event).await,
            Inbox::Cancel => {
                info!(chunk = %self.key, state = ?self.state, "Chunk capture cancelled");
                self.disconnect();
                self.monitor.stop().await;
            }
        }
    }

    fn watch_sink(&self) -> WatchSink {
        let tx = self.tx.clone();
        Arc::new(move |event: WatchEvent| {
            let _ = tx.send(Inbox::Watch(event));
        })
    }

    fn finish(&mut self, signal: FinishSignal) {
        let (next, completes) = self.state.on_finished(signal);
        self.state = next;
        if completes {
            self.announce_completed();
        }
    }

    fn announce_completed(&self) {
        info!(chunk = %self.key, context = %self.context_id, "Chunk execution completed");
        self.bus.publish(Notification::ExecutionCompleted {
            document_id: self.key.document_id.clone(),
            chunk_id: self.key.chunk_id.clone(),
            context_id: self.context_id.clone(),
        });
    }

    fn on_file_output(&mut self, path: &Path, output_type: OutputType) {
        let Some(artifact) = self.writer.write(path, output_type) else {
            return;
        };
        self.bus.publish(Notification::QueuedOutput {
            document_id: self.key.document_id.clone(),
            chunk_id: self.key.chunk_id.clone(),
            output_type,
            ordinal: artifact.output.ordinal,
            path: artifact.path.clone(),
        });
        self.writer.commit(&artifact);
    }

    fn on_console_text(&mut self, channel: ChannelType, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Err(e) = self.recorder.record(channel, text) {
            error!(chunk = %self.key, error = %e, "Failed to record console output");
        }
        self.bus.publish(Notification::LiveConsoleOutput {
            document_id: self.key.document_id.clone(),
            chunk_id: self.key.chunk_id.clone(),
            channel_type: channel,
            text: text.to_string(),
        });
    }
}

impl Drop for ChunkExecContext {
    fn drop(&mut self) {
        release(&self.console.prompt, &mut self.subs.prompt);
        release(&self.console.output, &mut self.subs.output);
        release(&self.console.input, &mut self.subs.input);
        release(&self.outputs.image_ready, &mut self.subs.image_ready);
        release(&self.outputs.image_capture_complete, &mut self.subs.image_complete);
        release(&self.outputs.widget_ready, &mut self.subs.widget_ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::ConsoleRecord;
    use crate::testing::{FakeWatchService, RecordingEngine, RegistrationMode};
    use crate::widgets::NoWidgetCapture;
    use events::NotificationEnvelope;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    struct Harness {
        temp_dir: TempDir,
        console: ConsoleEvents,
        engine: Arc<RecordingEngine>,
        watcher: Arc<FakeWatchService>,
        rx: broadcast::Receiver<NotificationEnvelope>,
        ctx: ChunkExecContext,
    }

    impl Harness {
        fn new(mode: RegistrationMode) -> Self {
            let temp_dir = TempDir::new().unwrap();
            let config = CaptureConfig {
                cache_root: temp_dir.path().join("cache"),
                context_id: "ctx-test".to_string(),
                ..Default::default()
            };
            Self::with_config(temp_dir, config, mode)
        }

        fn with_config(temp_dir: TempDir, config: CaptureConfig, mode: RegistrationMode) -> Self {
            let console = ConsoleEvents::new();
            let engine = Arc::new(RecordingEngine::new());
            let watcher = Arc::new(FakeWatchService::with_mode(mode));
            let bus = NotificationBus::new();
            let rx = bus.subscribe();
            let services = CaptureServices {
                engine: engine.clone(),
                watcher: watcher.clone(),
                widgets: Arc::new(NoWidgetCapture),
                bus,
            };
            let key = ChunkKey::new("doc1", "c1").unwrap();
            let ctx = ChunkExecContext::new(key, &config, console.clone(), services).unwrap();
            Self {
                temp_dir,
                console,
                engine,
                watcher,
                rx,
                ctx,
            }
        }

        fn plot(&self, n: u32) -> PathBuf {
            let path = self.ctx.output_dir().join(format!("_rs_chunk_plot_{n:03}.png"));
            std::fs::write(&path, format!("plot {n}")).unwrap();
            path
        }

        fn notifications(&mut self) -> Vec<Notification> {
            let mut seen = Vec::new();
            while let Ok(envelope) = self.rx.try_recv() {
                seen.push(envelope.notification);
            }
            seen
        }

        fn completions(notifications: &[Notification]) -> usize {
            notifications.iter().filter(|n| n.is_completion()).count()
        }
    }

    fn queued_ordinals(notifications: &[Notification]) -> Vec<(u32, OutputType)> {
        notifications
            .iter()
            .filter_map(|n| match n {
                Notification::QueuedOutput {
                    ordinal,
                    output_type,
                    ..
                } => Some((*ordinal, *output_type)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_plots_before_watch_are_queued_then_completed() {
        let mut h = Harness::new(RegistrationMode::Deferred);
        h.ctx.connect().await.unwrap();
        assert_eq!(h.ctx.state(), CompletionState::Both);

        h.plot(1);
        h.plot(2);
        h.watcher.complete_pending();
        h.console.prompt.emit(&"> ".to_string());
        h.ctx.process_pending().await;

        let seen = h.notifications();
        assert_eq!(
            queued_ordinals(&seen),
            vec![(0, OutputType::Plot), (1, OutputType::Plot)]
        );
        assert_eq!(Harness::completions(&seen), 1);
        assert!(seen.last().unwrap().is_completion());
        assert_eq!(h.ctx.state(), CompletionState::Completed);

        let dir = h.ctx.output_dir();
        assert_eq!(std::fs::read_to_string(dir.join("000000.png")).unwrap(), "plot 1");
        assert_eq!(std::fs::read_to_string(dir.join("000001.png")).unwrap(), "plot 2");
        assert!(!dir.join("_rs_chunk_plot_001.png").exists());
    }

    #[tokio::test]
    async fn test_plot_written_while_capturing() {
        let mut h = Harness::new(RegistrationMode::Immediate);
        h.ctx.connect().await.unwrap();
        h.ctx.process_pending().await;

        let path = h.plot(1);
        h.watcher.file_added(&path);
        h.ctx.process_pending().await;

        let seen = h.notifications();
        assert_eq!(queued_ordinals(&seen), vec![(0, OutputType::Plot)]);
        assert_eq!(Harness::completions(&seen), 0);
    }

    #[tokio::test]
    async fn test_image_completion_before_prompt() {
        let mut h = Harness::new(RegistrationMode::Fail("no watcher".to_string()));
        h.ctx.connect().await.unwrap();
        h.ctx.process_pending().await;
        assert_eq!(h.ctx.state(), CompletionState::ConsoleOnly);
        assert_eq!(Harness::completions(&h.notifications()), 0);

        h.console.prompt.emit(&"> ".to_string());
        h.ctx.process_pending().await;
        assert_eq!(Harness::completions(&h.notifications()), 1);

        h.console.prompt.emit(&"> ".to_string());
        h.ctx.process_pending().await;
        assert_eq!(Harness::completions(&h.notifications()), 0);
    }

    #[tokio::test]
    async fn test_prompt_before_image_completion() {
        let mut h = Harness::new(RegistrationMode::Deferred);
        h.ctx.connect().await.unwrap();

        h.console.prompt.emit(&"> ".to_string());
        h.ctx.process_pending().await;
        assert_eq!(h.ctx.state(), CompletionState::ImagesOnly);
        assert!(!h.ctx.console_connected());
        assert_eq!(Harness::completions(&h.notifications()), 0);

        h.watcher.complete_pending();
        h.ctx.process_pending().await;
        assert_eq!(Harness::completions(&h.notifications()), 1);
        assert_eq!(h.watcher.active_count(), 0);
    }

    #[tokio::test]
    async fn test_device_failure_captures_console_only() {
        let mut h = Harness::new(RegistrationMode::Immediate);
        h.engine.set_fail_open(true);
        h.ctx.connect().await.unwrap();
        assert_eq!(h.ctx.state(), CompletionState::ConsoleOnly);
        assert!(!h.ctx.images_connected());
        assert_eq!(h.ctx.outputs().image_ready.subscriber_count(), 0);

        h.console.prompt.emit(&"> ".to_string());
        h.ctx.process_pending().await;
        assert_eq!(Harness::completions(&h.notifications()), 1);
    }

    #[tokio::test]
    async fn test_output_directory_failure_completes_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("cache");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let config = CaptureConfig {
            cache_root: blocker,
            ..Default::default()
        };
        let mut h = Harness::with_config(temp_dir, config, RegistrationMode::Immediate);

        let err = h.ctx.connect().await.unwrap_err();
        assert!(matches!(err, CaptureError::OutputDirectory { .. }));
        assert_eq!(Harness::completions(&h.notifications()), 1);
        assert_eq!(h.console.prompt.subscriber_count(), 0);
        assert_eq!(h.watcher.register_calls(), 0);

        h.console.prompt.emit(&"> ".to_string());
        h.ctx.process_pending().await;
        assert_eq!(Harness::completions(&h.notifications()), 0);
    }

    #[tokio::test]
    async fn test_console_text_recorded_and_published() {
        let mut h = Harness::new(RegistrationMode::Immediate);
        h.ctx.connect().await.unwrap();

        h.console.input.emit(&"print(1)".to_string());
        h.console.output.emit(&ConsoleOutput::normal("[1] 1"));
        h.console.output.emit(&ConsoleOutput::normal(""));
        h.console.output.emit(&ConsoleOutput::error("Warning: x, y"));
        h.ctx.process_pending().await;

        let records = ConsoleRecorder::read_records(&h.ctx.cache.console_log(&h.ctx.key)).unwrap();
        assert_eq!(
            records,
            vec![
                ConsoleRecord {
                    channel: ChannelType::Input,
                    text: "print(1)".to_string()
                },
                ConsoleRecord {
                    channel: ChannelType::Output,
                    text: "[1] 1".to_string()
                },
                ConsoleRecord {
                    channel: ChannelType::Error,
                    text: "Warning: x, y".to_string()
                },
            ]
        );

        let live: Vec<_> = h
            .notifications()
            .into_iter()
            .filter(|n| matches!(n, Notification::LiveConsoleOutput { .. }))
            .collect();
        assert_eq!(live.len(), 3);
    }

    #[tokio::test]
    async fn test_console_ignored_after_prompt() {
        let mut h = Harness::new(RegistrationMode::Deferred);
        h.ctx.connect().await.unwrap();

        h.console.output.emit(&ConsoleOutput::normal("before"));
        h.console.prompt.emit(&"> ".to_string());
        h.ctx.process_pending().await;
        h.console.output.emit(&ConsoleOutput::normal("after"));
        h.ctx.process_pending().await;

        let records = ConsoleRecorder::read_records(&h.ctx.cache.console_log(&h.ctx.key)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "before");
        assert_eq!(h.console.output.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_widget_and_plot_share_ordinals() {
        let mut h = Harness::new(RegistrationMode::Immediate);
        h.ctx.connect().await.unwrap();
        h.ctx.process_pending().await;

        let staging = h.temp_dir.path().join("widget");
        std::fs::create_dir_all(staging.join("lib/htmlwidgets")).unwrap();
        std::fs::write(staging.join("lib/htmlwidgets/htmlwidgets.js"), "js").unwrap();
        let widget = staging.join("widget.html");
        std::fs::write(&widget, "<div></div>").unwrap();

        let plot = h.plot(1);
        h.watcher.file_added(&plot);
        h.ctx.process_pending().await;
        h.ctx.outputs().widget_ready.emit(&widget);
        h.ctx.process_pending().await;

        assert_eq!(
            queued_ordinals(&h.notifications()),
            vec![(0, OutputType::Plot), (1, OutputType::Html)]
        );
        let dir = h.ctx.output_dir();
        assert!(dir.join("000001.html").exists());
        let shared = h.ctx.cache.shared_lib_dir(h.ctx.document_id());
        assert!(shared.join("htmlwidgets/htmlwidgets.js").exists());
        assert!(!staging.join("lib").exists());
    }

    #[tokio::test]
    async fn test_failed_move_keeps_sequence_and_completes() {
        let mut h = Harness::new(RegistrationMode::Immediate);
        h.ctx.connect().await.unwrap();
        h.ctx.process_pending().await;

        let missing = h.ctx.output_dir().join("_rs_chunk_plot_009.png");
        h.ctx.outputs().image_ready.emit(&missing);
        let plot = h.plot(1);
        h.watcher.file_added(&plot);
        h.console.prompt.emit(&"> ".to_string());
        h.ctx.process_pending().await;

        let seen = h.notifications();
        assert_eq!(queued_ordinals(&seen), vec![(0, OutputType::Plot)]);
        assert_eq!(Harness::completions(&seen), 1);
    }

    #[tokio::test]
    async fn test_cancel_closes_device_and_completes_once() {
        let mut h = Harness::new(RegistrationMode::Immediate);
        h.ctx.connect().await.unwrap();
        h.ctx.process_pending().await;
        let plot = h.plot(1);

        assert!(h.ctx.cancel_handle().cancel());
        h.ctx.process_pending().await;

        assert_eq!(h.ctx.state(), CompletionState::Completed);
        assert_eq!(h.engine.close_count(), 1);
        assert_eq!(h.watcher.active_count(), 0);
        let seen = h.notifications();
        assert_eq!(queued_ordinals(&seen), vec![(0, OutputType::Plot)]);
        assert_eq!(Harness::completions(&seen), 1);
        assert!(!plot.exists());

        h.console.prompt.emit(&"> ".to_string());
        h.ctx.cancel_handle().cancel();
        h.ctx.process_pending().await;
        assert_eq!(Harness::completions(&h.notifications()), 0);
        assert_eq!(h.engine.close_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_subscriptions() {
        let mut h = Harness::new(RegistrationMode::Immediate);
        h.ctx.connect().await.unwrap();
        assert_eq!(h.console.prompt.subscriber_count(), 1);

        let console = h.console.clone();
        drop(h);
        assert_eq!(console.prompt.subscriber_count(), 0);
        assert_eq!(console.output.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_run_returns_after_completion() {
        let mut h = Harness::new(RegistrationMode::Immediate);
        h.ctx.connect().await.unwrap();
        h.console.prompt.emit(&"> ".to_string());

        let Harness { ctx, mut rx, .. } = h;
        tokio::time::timeout(std::time::Duration::from_secs(5), ctx.run())
            .await
            .unwrap();

        let mut completions = 0;
        while let Ok(envelope) = rx.try_recv() {
            if envelope.notification.is_completion() {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
    }
}
