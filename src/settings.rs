// ============================================================================
// APP SETTINGS — GUI preferences persisted across sessions
// ============================================================================
//
// Plain `key=value` lines.  Unknown keys are skipped and unparsable values
// keep their defaults, so old or hand-edited files always load.
// ============================================================================

use std::path::PathBuf;

use crate::config::ParticleConfig;

/// Application settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Last slider values.
    pub particles: ParticleConfig,
    /// Columns in the particle grid for newly loaded photos.
    pub grid_width: u32,
    /// "Auto", "integrated"/"low power", or "discrete"/"high performance".
    pub preferred_gpu: String,
    pub auto_rotate: bool,
    /// Auto-rotate speed (1.0 = one orbit per minute).
    pub auto_rotate_speed: f32,
    /// Manual audio level slider.
    pub audio_level: f32,
    /// Drive the audio level from a synthetic beat instead of the slider.
    pub pulse_enabled: bool,
    pub pulse_bpm: f32,
    /// Directory the open dialog starts in.
    pub last_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            particles: ParticleConfig::default(),
            grid_width: 180,
            preferred_gpu: "Auto".to_string(),
            auto_rotate: true,
            auto_rotate_speed: 0.5,
            audio_level: 0.0,
            pulse_enabled: false,
            pulse_bpm: 120.0,
            last_dir: None,
        }
    }
}

/// Largest grid width the settings file and UI accept.
pub const MAX_GRID_WIDTH: u32 = 1024;

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/photodust/photodust_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\PhotoDust\photodust_settings.cfg
    /// On macOS:   ~/Library/Application Support/PhotoDust/photodust_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("photodust");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("photodust_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("PhotoDust");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("photodust_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("PhotoDust");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("photodust_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("photodust_settings.cfg")))
        }
    }

    /// Serialize to the on-disk `key=value` format.
    pub fn to_config_string(&self) -> String {
        let p = &self.particles;
        format!(
            "size={}\n\
             dispersion={}\n\
             curvature={}\n\
             roughness={}\n\
             grid_width={}\n\
             preferred_gpu={}\n\
             auto_rotate={}\n\
             auto_rotate_speed={}\n\
             audio_level={}\n\
             pulse_enabled={}\n\
             pulse_bpm={}\n\
             last_dir={}\n",
            p.size,
            p.dispersion,
            p.curvature,
            p.roughness,
            self.grid_width,
            self.preferred_gpu,
            self.auto_rotate,
            self.auto_rotate_speed,
            self.audio_level,
            self.pulse_enabled,
            self.pulse_bpm,
            self.last_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
        )
    }

    /// Parse the `key=value` format.  Never fails.
    pub fn parse(content: &str) -> Self {
        fn float(val: &str, current: f32) -> f32 {
            val.parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(current)
        }

        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "size" => s.particles.size = float(val, s.particles.size),
                "dispersion" => s.particles.dispersion = float(val, s.particles.dispersion),
                "curvature" => s.particles.curvature = float(val, s.particles.curvature),
                "roughness" => s.particles.roughness = float(val, s.particles.roughness),
                "grid_width" => {
                    if let Ok(w) = val.parse::<u32>()
                        && (1..=MAX_GRID_WIDTH).contains(&w)
                    {
                        s.grid_width = w;
                    }
                }
                "preferred_gpu" => s.preferred_gpu = val.to_string(),
                "auto_rotate" => s.auto_rotate = val == "true",
                "auto_rotate_speed" => s.auto_rotate_speed = float(val, s.auto_rotate_speed),
                "audio_level" => s.audio_level = float(val, s.audio_level).clamp(0.0, 1.0),
                "pulse_enabled" => s.pulse_enabled = val == "true",
                "pulse_bpm" => s.pulse_bpm = float(val, s.pulse_bpm).max(0.0),
                "last_dir" => s.last_dir = (!val.is_empty()).then(|| PathBuf::from(val)),
                _ => {}
            }
        }
        s.particles = s.particles.clamped();
        s
    }

    /// Save settings to disk.  Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            log::warn!("could not save settings to {}: {e}", path.display());
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        log::debug!("settings loaded from {}", path.display());
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_settings_read_back() {
        let s = AppSettings {
            particles: ParticleConfig {
                size: 2.5,
                dispersion: 0.75,
                curvature: 1.25,
                roughness: 0.5,
            },
            grid_width: 240,
            preferred_gpu: "integrated".into(),
            auto_rotate: false,
            auto_rotate_speed: 1.5,
            audio_level: 0.25,
            pulse_enabled: true,
            pulse_bpm: 96.0,
            last_dir: Some(PathBuf::from("/tmp/photos")),
        };
        assert_eq!(AppSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn unknown_keys_and_bad_values_keep_defaults() {
        let s = AppSettings::parse(
            "theme=dark\n\
             size=banana\n\
             grid_width=0\n\
             roughness=NaN\n\
             no equals sign here\n\
             curvature=1.5\n",
        );
        let d = AppSettings::default();
        assert_eq!(s.particles.size, d.particles.size);
        assert_eq!(s.grid_width, d.grid_width);
        assert_eq!(s.particles.roughness, d.particles.roughness);
        assert_eq!(s.particles.curvature, 1.5);
    }

    #[test]
    fn out_of_range_sliders_are_pulled_back() {
        let s = AppSettings::parse("size=1000\naudio_level=7\n");
        assert_eq!(s.particles.size, *crate::config::SIZE_RANGE.end());
        assert_eq!(s.audio_level, 1.0);
    }

    #[test]
    fn empty_last_dir_is_none() {
        assert_eq!(AppSettings::parse("last_dir=\n").last_dir, None);
    }
}
