use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_relay::config::VadConfig;
use voice_relay::relay::{CommandRelay, HttpTransport};
use voice_relay::voice::{
    Announcer, AudioDevice, CpalDevice, EspeakAnnouncer, ResponsePlayer, StreamFormat, frame_energy,
    wav,
};
use voice_relay::{Backends, Config, Daemon, logging};

/// Wake word engine compiled into this binary
#[cfg(feature = "porcupine")]
const ENGINE_NOTE: &str = "Wake word engine: Porcupine.";

#[cfg(not(feature = "porcupine"))]
const ENGINE_NOTE: &str = "Wake word engine: none. This binary was built without the \
`porcupine` feature, so the session loop can never detect a wake word and keeps \
announcing \"Wake word system failed. Retrying.\" Rebuild with `--features porcupine`.";

/// Voice Relay - wake word voice client for a remote command service
#[derive(Parser)]
#[command(name = "voice-relay", version, about, after_help = ENGINE_NOTE)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "VOICE_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Check that the orchestrator is reachable
    Health,
    /// Speak a message through the announcer
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the announcement voice.")]
        text: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = logging::filter_for_verbosity(cli.verbose);

    // Config loading logs before the log file location is known
    let early = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .finish();
    let config = tracing::subscriber::with_default(early, || Config::load(cli.config.as_deref()));

    if let Err(e) = logging::init(cli.verbose, &config.log_file) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    tracing::debug!(?config, "loaded configuration");

    match run(cli.command, config) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Option<Command>, config: Config) -> anyhow::Result<ExitCode> {
    if let Some(cmd) = command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).map(|()| ExitCode::SUCCESS),
            Command::TestSpeaker => test_speaker().map(|()| ExitCode::SUCCESS),
            Command::Health => health(&config),
            Command::Say { text } => {
                EspeakAnnouncer::new().announce(&text);
                Ok(ExitCode::SUCCESS)
            }
        };
    }

    tracing::info!(
        orchestrator = %config.orchestrator.base_url(),
        debug_audio = config.debug_audio.enabled,
        "starting voice relay"
    );
    #[cfg(not(feature = "porcupine"))]
    tracing::warn!("built without the `porcupine` feature, wake words will never be detected");

    let backends = Backends::system(&config)?;
    let mut daemon = Daemon::new(&config, backends);
    daemon.run()
}

/// Test microphone input
fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let vad = VadConfig::default();
    let frame_len = vad.frame_len();
    let frames_per_second = 1000 / vad.frame_duration.as_millis().max(1);

    let device = CpalDevice::new();
    let mut stream = device.open_input(StreamFormat {
        sample_rate: vad.sample_rate,
        channels: vad.channels,
        frames_per_buffer: frame_len / usize::from(vad.channels),
    })?;
    stream.start()?;

    println!("Sample rate: {} Hz", vad.sample_rate);
    println!("---");

    let mut frame = vec![0i16; frame_len];
    let result = (0..duration).try_for_each(|i| -> anyhow::Result<()> {
        let mut total = 0.0;
        let mut speech_frames = 0;
        for _ in 0..frames_per_second {
            stream.read(&mut frame)?;
            let energy = frame_energy(&frame);
            total += energy;
            if energy > vad.start_energy() {
                speech_frames += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let rms = (total / frames_per_second as f64).sqrt();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms / 40.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {rms:7.1} | speech frames: {speech_frames:2} | [{meter}]",
            i + 1
        );
        Ok(())
    });

    stream.stop()?;
    result?;

    println!("\n---");
    println!("Speech starts above an RMS of {}.", vad.start_threshold);
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    // 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let samples: Vec<i16> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            // 30% volume
            ((2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 * f32::from(i16::MAX)) as i16
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());

    let bytes = wav::encode(&samples, sample_rate, 1)?;
    let device: Rc<dyn AudioDevice> = Rc::new(CpalDevice::new());
    ResponsePlayer::new(device).play(&bytes)?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// One reachability probe
fn health(config: &Config) -> anyhow::Result<ExitCode> {
    let transport = HttpTransport::new(&config.orchestrator)?;
    let relay = CommandRelay::new(Box::new(transport), &config.orchestrator);

    match relay.check_health() {
        Ok(()) => {
            println!("orchestrator at {} is reachable", config.orchestrator.base_url());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("orchestrator at {} is not reachable: {e}", config.orchestrator.base_url());
            Ok(ExitCode::FAILURE)
        }
    }
}
