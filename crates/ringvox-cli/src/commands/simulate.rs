//! Drive the engine over a virtual output device.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ringvox_core::config::user_config_path;
use ringvox_core::{
    ChannelId, EffectKind, EffectSlotId, EngineConfig, FadeDirection, Manager, SourceKind,
    Vec3, VirtualBackend, VoiceHandle, VoiceState,
};
use ringvox_io::FileOpener;
use tracing::warn;

use super::common::{parse_channel, parse_range, parse_vec3};

/// Simulate playback of one or more files.
#[derive(Args)]
pub struct SimulateArgs {
    /// Audio files, each played as its own voice
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Decode each file into memory instead of streaming it
    #[arg(long = "static")]
    pub load_static: bool,

    /// Loop the whole file
    #[arg(long = "loop")]
    pub looping: bool,

    /// Loop the sample range A:B
    #[arg(long, value_parser = parse_range, conflicts_with = "looping")]
    pub abloop: Option<(u64, u64)>,

    /// Voice gain
    #[arg(long, default_value_t = 1.0)]
    pub gain: f32,

    /// Fade in over this many seconds
    #[arg(long, conflicts_with = "fade_out")]
    pub fade_in: Option<f32>,

    /// Fade out over this many seconds
    #[arg(long)]
    pub fade_out: Option<f32>,

    /// Start playback at this time in seconds
    #[arg(long)]
    pub seek: Option<f64>,

    /// Voice position as X,Y,Z
    #[arg(long, value_parser = parse_vec3)]
    pub position: Option<Vec3>,

    /// Voice velocity as X,Y,Z
    #[arg(long, value_parser = parse_vec3)]
    pub velocity: Option<Vec3>,

    /// Send every voice through an effect slot running this effect
    #[arg(long)]
    pub effect: Option<String>,

    /// Channel the voices play on (sound, music, voice)
    #[arg(long, value_parser = parse_channel, default_value = "sound")]
    pub channel: ChannelId,

    /// Simulated time per engine update, in milliseconds
    #[arg(long, default_value_t = 20)]
    pub tick_ms: u64,

    /// Stop after this many simulated seconds
    #[arg(long)]
    pub max_secs: Option<f64>,

    /// Sleep for each tick so the simulation runs at wall-clock speed
    #[arg(long)]
    pub realtime: bool,

    /// Run without any output device
    #[arg(long)]
    pub headless: bool,

    /// Engine settings file (defaults to the per-user config)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

struct Tracked {
    name: String,
    handle: VoiceHandle,
    bar: ProgressBar,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> anyhow::Result<()> {
    if args.tick_ms == 0 {
        anyhow::bail!("--tick-ms must be at least 1");
    }
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::load_or_default(user_config_path())?,
    };

    let monitor = VirtualBackend::new();
    let mut manager = if args.headless {
        Manager::headless(FileOpener::new(), config)
    } else {
        Manager::new(Box::new(monitor.clone()), FileOpener::new(), config)
    };

    let failures = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&failures);
    manager.set_load_error_hook(move |_, _| counter.set(counter.get() + 1));

    let slot = match args.effect.as_deref() {
        Some(name) if manager.is_headless() => {
            warn!(effect = name, "no device, effect ignored");
            None
        }
        Some(name) => Some(effect_slot(&mut manager, name)?),
        None => None,
    };

    let kind = if args.load_static {
        SourceKind::Static
    } else {
        SourceKind::Stream
    };

    let bars = MultiProgress::new();
    let style = ProgressStyle::default_bar()
        .template("{prefix:>16} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("##-");

    let mut voices = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let handle = manager.create_voice(path, args.channel, kind);
        let Some(mut voice) = manager.voice_mut(handle) else {
            continue;
        };
        voice.set_gain(args.gain);
        if let Some(position) = args.position {
            voice.set_position(position);
        }
        if let Some(velocity) = args.velocity {
            voice.set_velocity(velocity);
        }
        if let Some((begin, end)) = args.abloop {
            voice
                .set_loop(begin, end)
                .with_context(|| format!("--abloop on {}", path.display()))?;
        } else if args.looping {
            voice.set_looping(true)?;
        }
        if let Some(secs) = args.seek {
            voice
                .seek_to(secs)
                .with_context(|| format!("--seek on {}", path.display()))?;
        }
        if let Some(secs) = args.fade_in {
            voice.set_fading(FadeDirection::In, secs);
        } else if let Some(secs) = args.fade_out {
            voice.set_fading(FadeDirection::Out, secs);
        }
        if slot.is_some() {
            voice.set_effect_slot(slot, None);
        }

        let bar = bars.add(ProgressBar::new(voice.sample_duration()));
        bar.set_style(style.clone());
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        bar.set_prefix(name.clone());
        voice.play();
        voices.push(Tracked { name, handle, bar });
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let tick = Duration::from_millis(args.tick_ms);
    let dt = tick.as_secs_f32();
    let limit = args
        .max_secs
        .map(|secs| Duration::try_from_secs_f64(secs).context("--max-secs"))
        .transpose()?;
    let mut elapsed = Duration::ZERO;
    let mut ticks = 0u64;
    loop {
        let interrupted = !running.load(Ordering::SeqCst);
        let out_of_time = limit.is_some_and(|max| elapsed >= max);
        if interrupted || out_of_time {
            for id in ChannelId::ALL {
                manager.channel_mut(id).finish_all();
            }
        }

        manager.update(dt);
        elapsed += tick;
        ticks += 1;

        for tracked in &voices {
            report(&mut manager, tracked);
        }
        let all_done = voices
            .iter()
            .all(|t| manager.voice_state(t.handle) == VoiceState::Finished);
        if all_done || interrupted || out_of_time {
            break;
        }
        if args.realtime {
            std::thread::sleep(tick);
        }
    }

    for tracked in &voices {
        tracked.bar.finish();
    }

    println!();
    println!("Backend:     {}", manager.backend_name().unwrap_or("none (headless)"));
    println!(
        "Simulated:   {:.3}s in {ticks} updates",
        elapsed.as_secs_f64()
    );
    println!("Load errors: {}", failures.get());
    if !args.headless {
        println!("Device time: {:.3}s", monitor.clock());
        println!(
            "Objects:     {} sources, {} buffers created",
            monitor.sources_created(),
            monitor.buffers_created()
        );
    }
    for tracked in &voices {
        println!("  {:<24} {:?}", tracked.name, manager.voice_state(tracked.handle));
    }
    if !running.load(Ordering::SeqCst) {
        println!("Interrupted.");
    }
    Ok(())
}

fn effect_slot(manager: &mut Manager, name: &str) -> anyhow::Result<EffectSlotId> {
    let Some(kind) = EffectKind::from_name(name) else {
        let names: Vec<&str> = EffectKind::ALL.iter().map(|k| k.name()).collect();
        anyhow::bail!(
            "unknown effect '{name}', valid values are: {}",
            names.join(", ")
        );
    };
    let effect = manager.create_effect(kind)?;
    let slot = manager.create_effect_slot()?;
    manager.attach_effect(slot, Some(effect))?;
    Ok(slot)
}

fn report(manager: &mut Manager, tracked: &Tracked) {
    let Some(voice) = manager.voice_mut(tracked.handle) else {
        tracked.bar.set_message("finished");
        return;
    };
    tracked.bar.set_position(voice.cursor_pos());
    tracked.bar.set_message(format!("{:.2}s {:?}", voice.pos(), voice.state()));
}
