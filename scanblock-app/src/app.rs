use crate::keys::key_name;
use crate::presenter::WindowPresenter;
use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};
use pixels::{Pixels, SurfaceTexture};
use scanblock_core::{InputSignal, Screen};
use scanblock_experiment::{
    ChannelSource, NotificationBus, RunConfig, RunSummary, Scheduler, SchedulerError,
};
use scanblock_render::{BlockRenderer, FontVec};
use scanblock_timing::{HighPrecisionTimer, Timer};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{Fullscreen, Window, WindowId},
};

const WINDOWED_SIZE: PhysicalSize<u32> = PhysicalSize::new(1024, 768);

/// Requests the scheduler thread sends to the event loop.
#[derive(Debug, Clone)]
pub enum DisplayRequest {
    /// Present this screen and reply with the time it became visible.
    Draw(Screen),
    Exit,
}

/// Window side of a run: owns the surface, draws what the scheduler asks for
/// and turns key presses into timestamped input signals.
pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<BlockRenderer>,
    font: Option<FontVec>,
    timer: HighPrecisionTimer,

    keys: Sender<InputSignal>,
    replies: Sender<Result<f64, String>>,
    screen: Option<Screen>,
    awaiting_reply: bool,

    fullscreen: bool,
    abort_key: String,
    refresh_rate: Option<f64>,
    failure: Option<anyhow::Error>,
}

impl App {
    pub fn new(
        config: &RunConfig,
        font: Option<FontVec>,
        timer: HighPrecisionTimer,
        keys: Sender<InputSignal>,
        replies: Sender<Result<f64, String>>,
    ) -> Self {
        Self {
            window: None,
            pixels: None,
            renderer: None,
            font,
            timer,
            keys,
            replies,
            screen: None,
            awaiting_reply: false,
            fullscreen: config.fullscreen,
            abort_key: config.abort_key.clone(),
            refresh_rate: None,
            failure: None,
        }
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;
        self.refresh_rate = monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let mut attributes = Window::default_attributes()
            .with_title("scanblock")
            .with_resizable(!self.fullscreen);
        attributes = if self.fullscreen {
            attributes.with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
        } else {
            attributes.with_inner_size(WINDOWED_SIZE)
        };

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        info!(
            width = size.width,
            height = size.height,
            scale_factor = window.scale_factor(),
            refresh_hz = self.refresh_rate,
            "display ready"
        );

        let surface = SurfaceTexture::new(size.width, size.height, Arc::clone(&window));
        self.pixels = Some(Pixels::new(size.width, size.height, surface)?);
        self.renderer = Some(BlockRenderer::new(
            size.width,
            size.height,
            self.font.take(),
        )?);

        if self.fullscreen {
            window.set_cursor_visible(false);
        }
        self.window = Some(window);
        Ok(())
    }

    /// Draws the current screen and returns the time after the buffer swap.
    fn present(&mut self) -> Result<f64> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Err(anyhow!("surface not ready"));
        };
        let Some(screen) = self.screen.as_ref() else {
            return Ok(self.timer.now());
        };
        renderer.render_frame(screen, pixels.frame_mut())?;
        pixels.render()?;
        Ok(self.timer.now())
    }

    fn present_and_reply(&mut self) {
        let shown = self.present().map_err(|e| format!("{e:#}"));
        if let Err(e) = &shown {
            error!(error = %e, "frame failed");
        }
        if self.awaiting_reply {
            self.awaiting_reply = false;
            if self.replies.send(shown).is_err() {
                debug!("scheduler gone, frame reply dropped");
            }
        }
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(size.width, size.height) {
                warn!(error = %e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(size.width, size.height) {
                warn!(error = %e, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(size.width, size.height) {
                warn!(error = %e, "failed to resize renderer");
            }
        }
        debug!(width = size.width, height = size.height, "display resized");
    }

    fn send_key(&self, key: &str) {
        let signal = InputSignal::new(key, self.timer.now());
        if self.keys.send(signal).is_err() {
            debug!(key, "scheduler gone, key dropped");
        }
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler<DisplayRequest> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create_window_and_surface(event_loop) {
            error!(error = %e, "failed to create window and surface");
            self.failure = Some(e);
            event_loop.exit();
            return;
        }
        // a draw may have arrived before the window existed
        if self.awaiting_reply {
            self.present_and_reply();
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, request: DisplayRequest) {
        match request {
            DisplayRequest::Draw(screen) => {
                self.screen = Some(screen);
                self.awaiting_reply = true;
                if self.pixels.is_some() {
                    self.present_and_reply();
                }
            }
            DisplayRequest::Exit => self.exit(event_loop),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            // closing the window counts as an abort; the scheduler ends the loop
            WindowEvent::CloseRequested => {
                let abort = self.abort_key.clone();
                self.send_key(&abort);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.present() {
                    warn!(error = %e, "redraw failed");
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                match key_name(event.physical_key) {
                    Some(name) => self.send_key(name),
                    None => debug!(key = ?event.physical_key, "unmapped key"),
                }
            }
            WindowEvent::Resized(size) => {
                self.handle_resize(size);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Sends `Exit` to the event loop when the scheduler thread ends, even by panic.
struct ExitOnDrop(EventLoopProxy<DisplayRequest>);

impl Drop for ExitOnDrop {
    fn drop(&mut self) {
        let _ = self.0.send_event(DisplayRequest::Exit);
    }
}

fn spawn_scheduler(
    config: RunConfig,
    bus: NotificationBus,
    timer: HighPrecisionTimer,
    proxy: EventLoopProxy<DisplayRequest>,
    keys: Receiver<InputSignal>,
    replies: Receiver<Result<f64, String>>,
) -> Result<JoinHandle<Result<RunSummary, SchedulerError>>> {
    let handle = std::thread::Builder::new()
        .name("scheduler".into())
        .spawn(move || {
            let _exit = ExitOnDrop(proxy.clone());
            let presenter = WindowPresenter::new(proxy, replies, keys.clone(), config.clone());
            let scheduler = Scheduler::new(config, ChannelSource::new(keys), presenter, timer, bus)?;
            scheduler.run()
        })?;
    Ok(handle)
}

/// Opens the stimulus window and runs the scheduler against it until the run
/// completes or is aborted. Must be called from the main thread.
///
/// Key presses are sent on `key_tx`; other producers (a simulated scanner)
/// may hold clones of it. The scheduler reads `key_rx`.
pub fn run_windowed(
    config: RunConfig,
    bus: NotificationBus,
    font: Option<FontVec>,
    timer: HighPrecisionTimer,
    key_tx: Sender<InputSignal>,
    key_rx: Receiver<InputSignal>,
) -> Result<RunSummary> {
    let event_loop = EventLoop::<DisplayRequest>::with_user_event().build()?;
    let proxy = event_loop.create_proxy();
    let (reply_tx, reply_rx) = bounded::<Result<f64, String>>(1);

    let mut app = App::new(&config, font, timer.clone(), key_tx, reply_tx);
    let worker = spawn_scheduler(config, bus, timer, proxy, key_rx, reply_rx)?;

    let looped = event_loop.run_app(&mut app);
    let failure = app.failure.take();
    // dropping the app closes both channels so a blocked scheduler wakes up
    drop(app);

    let summary = worker
        .join()
        .map_err(|_| anyhow!("scheduler thread panicked"))?;
    if let Some(e) = failure {
        return Err(e);
    }
    looped?;
    Ok(summary?)
}
