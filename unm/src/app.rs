use crossbeam_queue::ArrayQueue;
use log::*;
use std::{
    path::PathBuf,
    sync::{Arc, mpsc::{self, Receiver, Sender}},
    time::Duration,
};
use tokio::{runtime::Runtime, task::JoinHandle};
use unm_audio::{AudioEngine, EngineConfig};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy},
    window::{Window, WindowAttributes, WindowId},
};

use crate::{
    activation::Activation,
    audio_store::{load_audio_settings, save_audio_settings},
    game_loop::GameLoop,
    game_settings::GameSettings,
    tools::*,
};

/// 帧线程可以发送给主线程的命令，用于控制窗口行为。
#[derive(Debug)]
pub enum WindowCommand {
    SetTitle(String),
    Quit,
}

/// 帧线程可以接收的生命周期命令。
enum FrameCommand {
    /// 应用进入后台：保存音频设置并失活
    Suspend,
    /// 从后台返回：重新读取设置并恢复激活
    Resume,
    /// 保存设置后退出帧循环
    Close,
}

/// 窗口焦点变化，由主线程推入队列、帧线程每帧取出。
#[derive(Debug, Clone, Copy)]
enum FocusEvent {
    Gained,
    Lost,
}

/// 应用程序的主结构，管理 winit 窗口和运行游戏逻辑与音频的帧线程。
pub struct App {
    window: Option<Window>,

    /// 用于向帧线程发送命令的发送者。
    frame_command_sender: Option<Sender<FrameCommand>>,
    /// 从帧线程向 winit 事件循环发送 `UserEvent` 的代理。
    event_proxy: EventLoopProxy<WindowCommand>,

    /// 帧线程的 Tokio `JoinHandle`。
    frame_task_handle: Option<JoinHandle<()>>,

    /// 应用程序的 Tokio 运行时。
    runtime: Option<Runtime>,

    event_loop: Option<EventLoop<WindowCommand>>,

    max_level: LevelFilter,

    /// 游戏的实例
    game: Option<Box<dyn GameLoop>>,

    audio_config: EngineConfig,
    settings_path: PathBuf,

    focus_events: Arc<ArrayQueue<FocusEvent>>,
}

impl App {
    pub fn new(game: impl GameLoop + 'static) -> Self {
        let mut event_loop_builder = EventLoop::<WindowCommand>::with_user_event();
        platform_specific::configure_event_loop_builder(&mut event_loop_builder);

        let event_loop = event_loop_builder
            .build()
            .expect("Failed to build event loop");

        let event_proxy = event_loop.create_proxy();
        event_loop.set_control_flow(ControlFlow::Wait);

        Self {
            window: None,
            frame_command_sender: None,
            event_proxy,
            frame_task_handle: None,
            runtime: None,

            event_loop: Some(event_loop),
            max_level: LevelFilter::Info,

            game: Some(Box::new(game)),

            audio_config: EngineConfig::default(),
            settings_path: PathBuf::from("audio_settings.toml"),

            focus_events: Arc::new(ArrayQueue::new(32)),
        }
    }

    pub fn set_logger_max_level(mut self, max_level: LevelFilter) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn set_audio_config(mut self, config: EngineConfig) -> Self {
        self.audio_config = config;
        self
    }

    pub fn set_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = path;
        self
    }

    pub fn run(&mut self) {
        platform_specific::init_logger(self.max_level);
        if let Some(event_loop) = self.event_loop.take() {
            if let Err(e) = event_loop.run_app(self) {
                error!("Event loop terminated with error: {:?}", e);
            }
        }
    }

    /// 第一次 `resumed` 回调时创建窗口并启动帧线程。
    fn initialize_app_components(&mut self, event_loop: &ActiveEventLoop) {
        info!("Initializing window and frame task...");

        match event_loop.create_window(WindowAttributes::default().with_title("unm")) {
            Ok(window) => {
                if let Err(e) = self.start_frame_task(&window) {
                    error!("Failed to start frame task: {:?}", e);
                    event_loop.exit();
                }
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to create window: {:?}", e);
                event_loop.exit();
            }
        }
    }

    fn start_frame_task(&mut self, window: &Window) -> anyhow::Result<()> {
        let game = self
            .game
            .take()
            .ok_or_else(|| anyhow::anyhow!("game loop instance was already started"))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let (frame_command_sender, frame_command_receiver) = mpsc::channel();
        self.frame_command_sender = Some(frame_command_sender);

        let context = FrameContext {
            commands: frame_command_receiver,
            focus_events: Arc::clone(&self.focus_events),
            game_settings: GameSettings::new(self.event_proxy.clone(), self.settings_path.clone()),
            audio: AudioEngine::for_platform(self.audio_config.clone()),
            display_frametime: detect_frametime(window),
        };

        self.frame_task_handle = Some(runtime.spawn(frame_loop(context, game)));
        self.runtime = Some(runtime);
        Ok(())
    }

    fn send_frame_command(&self, command: FrameCommand) {
        if let Some(sender) = self.frame_command_sender.as_ref() {
            let _ = sender.send(command);
        }
    }
}

struct FrameContext {
    commands: Receiver<FrameCommand>,
    focus_events: Arc<ArrayQueue<FocusEvent>>,
    game_settings: GameSettings,
    audio: AudioEngine,
    display_frametime: Duration,
}

fn save_settings(game_settings: &GameSettings, audio: &AudioEngine) {
    if let Err(e) = save_audio_settings(game_settings.settings_path(), &audio.settings()) {
        warn!("Failed to save audio settings: {:#}", e);
    }
}

/// 帧线程的主循环：游戏逻辑、音频轮询、限帧。
async fn frame_loop(context: FrameContext, mut game: Box<dyn GameLoop>) {
    let FrameContext {
        commands,
        focus_events,
        mut game_settings,
        mut audio,
        display_frametime,
    } = context;

    audio.initialize();
    audio.apply_settings(&load_audio_settings(game_settings.settings_path()));
    if audio.music_unavailable() {
        info!("Music is unavailable on this platform; sound effects only.");
    }

    game.start(&mut game_settings, &mut audio).await;

    let mut activation = Activation::new();
    let mut time_manager = TimeManager::new();

    loop {
        while let Ok(command) = commands.try_recv() {
            match command {
                FrameCommand::Suspend => {
                    save_settings(&game_settings, &audio);
                    if let Some(change) = activation.on_suspend_changed(true) {
                        change.apply(&mut audio);
                    }
                }
                FrameCommand::Resume => {
                    audio.apply_settings(&load_audio_settings(game_settings.settings_path()));
                    if let Some(change) = activation.on_suspend_changed(false) {
                        change.apply(&mut audio);
                    }
                }
                FrameCommand::Close => {
                    info!("Frame task received close command. Exiting frame loop.");
                    save_settings(&game_settings, &audio);
                    audio.shutdown();
                    return;
                }
            }
        }

        while let Some(event) = focus_events.pop() {
            let focused = matches!(event, FocusEvent::Gained);
            if let Some(change) = activation.on_focus_changed(focused) {
                change.apply(&mut audio);
            }
        }

        time_manager.update();

        if !activation.is_deactivated() {
            game.update(&mut game_settings, &time_manager, &mut audio).await;
        }

        for deactivated in game_settings.take_deactivation_requests() {
            if let Some(change) = activation.set_window_deactivated(deactivated) {
                change.apply(&mut audio);
            }
        }

        let errors = audio.update();
        if !errors.is_empty() {
            debug!("Audio engine recovered from errors {:#x}", errors.bits());
        }

        framerate_limiter(&mut time_manager, &game_settings, display_frametime);
        tokio::task::yield_now().await;
    }
}

/// [`App`] 的 `Drop` 实现，负责清理资源。
impl Drop for App {
    fn drop(&mut self) {
        info!("Dropping App: Sending close command to frame task.");
        if let Some(sender) = self.frame_command_sender.take() {
            let _ = sender.send(FrameCommand::Close);
        }

        if let Some(runtime) = self.runtime.take() {
            // 给帧线程一点时间保存设置并关闭音频
            if let Some(handle) = self.frame_task_handle.take() {
                let _ = runtime.block_on(async {
                    tokio::time::timeout(Duration::from_secs(1), handle).await
                });
            }
            info!("Dropping App: Shutting down Tokio runtime.");
            runtime.shutdown_background();
        }
    }
}

/// [`ApplicationHandler`] 的实现，处理 winit 事件。
impl ApplicationHandler<WindowCommand> for App {
    /// 处理帧线程发来的窗口命令。
    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: WindowCommand) {
        match event {
            WindowCommand::SetTitle(title) => {
                if let Some(window) = self.window.as_ref() {
                    window.set_title(&title);
                }
            }
            WindowCommand::Quit => {
                self.send_frame_command(FrameCommand::Close);
                event_loop.exit();
            }
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.frame_command_sender.is_none() {
            info!("Application resumed, initializing...");
            self.initialize_app_components(event_loop);
        } else {
            info!("Application resumed from background.");
            self.send_frame_command(FrameCommand::Resume);
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        info!("Application suspended.");
        self.send_frame_command(FrameCommand::Suspend);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::Focused(focused) => {
                let event = if focused { FocusEvent::Gained } else { FocusEvent::Lost };
                if let Err(e) = self.focus_events.push(event) {
                    warn!("Failed to send focus event to frame task: {:?}", e);
                }
            }
            WindowEvent::CloseRequested => {
                info!("Window close requested. Exiting application.");
                self.send_frame_command(FrameCommand::Close);
                event_loop.exit();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        info!("Application exiting. Sending close command to frame task.");
        self.send_frame_command(FrameCommand::Close);
    }
}
