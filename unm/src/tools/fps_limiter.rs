// https://github.com/aevyrie/bevy_framepace/blob/main/src/lib.rs
// MIT License

// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use std::time::{Duration, Instant};

use winit::window::Window;

use crate::{game_settings::GameSettings, tools::TimeManager};

const FALLBACK_REFRESH_RATE: f64 = 60.0;

#[cfg(target_os = "android")]
fn get_refresh_rate() -> Option<f64> {
    use crate::ANDROID_APP;
    use jni::objects::JObject;
    use jni::JavaVM;

    let app = ANDROID_APP.get()?;

    unsafe {
        let vm = JavaVM::from_raw(app.vm_as_ptr() as *mut _).ok()?;
        let mut env = vm.attach_current_thread().ok()?;
        let activity = JObject::from_raw(app.activity_as_ptr() as jni::sys::jobject);

        match env.call_method(&activity, "getRefreshRate", "()F", &[]) {
            Ok(val) => val.f().ok().map(f64::from),
            Err(e) => {
                log::warn!("JNI getRefreshRate failed: {:?}", e);
                None
            }
        }
    }
}

#[allow(unused_variables)]
fn get_platform_refresh_rate(window: &Window) -> f64 {
    #[cfg(target_os = "android")]
    {
        get_refresh_rate().unwrap_or(FALLBACK_REFRESH_RATE)
    }

    #[cfg(not(target_os = "android"))]
    {
        // 略低于刷新率，避免与垂直同步节拍对齐产生抖动
        window
            .current_monitor()
            .and_then(|m| m.refresh_rate_millihertz())
            .map(|mhz| mhz as f64 / 1000.0 - 0.5)
            .unwrap_or(FALLBACK_REFRESH_RATE)
    }
}

/// 在主线程创建窗口后调用一次
pub fn detect_frametime(window: &Window) -> Duration {
    Duration::from_secs_f64(1.0 / get_platform_refresh_rate(window).max(1.0))
}

pub fn framerate_limiter(
    timer: &mut TimeManager,
    game_settings: &GameSettings,
    display_frametime: Duration,
) {
    let target_fps = game_settings.get_target_fps();
    let limit = if target_fps > 0 {
        Duration::from_secs_f64(1.0 / target_fps as f64)
    } else {
        display_frametime
    };

    let frame_time = timer.sleep_end.elapsed();
    let sleep_time = limit.saturating_sub(frame_time + timer.oversleep);
    spin_sleep::sleep(sleep_time);

    let frame_time_total = timer.sleep_end.elapsed();
    timer.sleep_end = Instant::now();
    timer.oversleep = frame_time_total.saturating_sub(limit);
}
