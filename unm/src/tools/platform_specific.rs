use log::*;
use winit::event_loop::EventLoopBuilder;

use crate::app::WindowCommand;

// ======================= Logger Initialization =======================
pub fn init_logger(max_level: LevelFilter) {
    #[cfg(not(target_os = "android"))]
    {
        let _ = env_logger::builder()
            .filter_level(max_level)
            .parse_default_env()
            .try_init();
        info!("Logger initialized for {}.", std::env::consts::OS);
    }

    #[cfg(target_os = "android")]
    {
        use android_logger::Config;
        android_logger::init_once(Config::default().with_max_level(max_level));
        info!("Logger initialized for Android.");
    }
}

// ======================= EventLoop Builder Configuration =======================
#[allow(unused_variables)]
pub fn configure_event_loop_builder(event_loop_builder: &mut EventLoopBuilder<WindowCommand>) {
    #[cfg(target_os = "windows")]
    {
        use winit::platform::windows::EventLoopBuilderExtWindows;
        event_loop_builder.with_any_thread(false);
        info!("EventLoopBuilder configured for Windows.");
    }

    #[cfg(target_os = "android")]
    {
        use winit::platform::android::EventLoopBuilderExtAndroid;
        use crate::ANDROID_APP;

        match ANDROID_APP.get() {
            Some(app) => {
                event_loop_builder.with_android_app(app.clone());
                info!("EventLoopBuilder configured for Android.");
            }
            None => error!("AndroidApp was not set before configuring EventLoopBuilder"),
        }
    }
}
