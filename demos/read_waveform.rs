// Waveform acquisition example
//
// Arms a single acquisition, reads one channel back as calibrated samples
// and reports its enhanced-resolution setting.

use clap::Parser;
use std::time::Duration;
use wavesurfer_rs::{Channel, OutputShape, Scope, ScopeConfig, SerialConfig};

#[derive(Parser, Debug)]
#[command(about = "Read one waveform from a WaveSurfer oscilloscope")]
struct Args {
    /// Serial port the oscilloscope is attached to
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Channel number (1-4)
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    channel: u8,

    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,

    /// Skip the time axis
    #[arg(long)]
    voltage_only: bool,

    /// Seconds to wait for the acquisition before reading it back
    #[arg(long, default_value_t = 0.5)]
    settle: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let channel = Channel::from_number(args.channel).ok_or("channel must be 1-4")?;
    let serial = SerialConfig::new(&args.port).with_baud_rate(args.baud);
    let mut scope = Scope::open(&serial, ScopeConfig::default())?;
    println!("Connected to oscilloscope on {}\n", args.port);

    match scope.probe_bit_depth(channel) {
        Ok(bits) => println!("{channel} enhanced resolution: {bits} bits"),
        Err(e) => println!("{channel} enhanced resolution unavailable: {e}"),
    }
    match scope.eres_bandwidth(channel) {
        Ok(bandwidth) => println!("{channel} effective bandwidth: {:.3e} Hz\n", bandwidth),
        Err(e) => println!("{channel} effective bandwidth unavailable: {e}\n"),
    }

    scope.arm()?;
    std::thread::sleep(Duration::from_secs_f64(args.settle));

    let shape = if args.voltage_only {
        OutputShape::VoltageOnly
    } else {
        OutputShape::WithTime
    };
    let acquisition = scope.waveform(channel, shape)?;

    if let Some(misalignment) = acquisition.misalignment {
        println!("Warning: {misalignment}");
    }
    println!("Captured {} samples", acquisition.waveform.len());
    println!("Vertical scale:   {:?}", acquisition.volts_per_division);
    println!("Horizontal scale: {:?}", acquisition.time_per_division);

    let voltage = acquisition.waveform.voltage();
    if !voltage.is_empty() {
        let min = voltage.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = voltage.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        println!("Voltage range: {min:.4} V .. {max:.4} V");
    }

    let df = acquisition.waveform.to_dataframe()?;
    println!("\n{}", df.head(Some(10)));

    Ok(())
}
