use clap::Parser;
use shared::{drain_frames, Command};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Scripted player: connects, presses keys on a timer and reports the frames it receives
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:4242")]
    server: SocketAddr,
    /// Keys to press in order, e.g. "ssddq"
    #[clap(short, long, default_value = "")]
    keys: String,
    /// Milliseconds between key presses
    #[clap(short, long, default_value = "500")]
    delay: u64,
    /// Frames to wait for once the keys are used up
    #[clap(short, long, default_value = "20")]
    frames: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut commands = Vec::new();
    for key in args.keys.bytes() {
        match Command::from_byte(key) {
            Some(command) => commands.push(command),
            None => println!("Warning: '{}' is not a game key, skipping", key as char),
        }
    }

    println!("Connecting to {}", args.server);
    let mut stream = TcpStream::connect(args.server).await?;
    println!("Connected from {}", stream.local_addr()?);

    let mut keys = commands.into_iter();
    let mut presses = interval(Duration::from_millis(args.delay.max(1)));
    presses.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately
    presses.tick().await;

    let mut pending = Vec::new();
    let mut buf = [0u8; 4096];
    let mut received = 0usize;
    let mut remaining = args.frames;

    loop {
        tokio::select! {
            _ = presses.tick() => {
                match keys.next() {
                    Some(command) => {
                        let key = command.as_byte();
                        println!("Pressing '{}' ({:?})", key as char, command);
                        stream.write_all(&[key]).await?;
                    }
                    None if remaining == 0 => break,
                    None => {}
                }
            }
            read = timeout(Duration::from_secs(5), stream.read(&mut buf)) => {
                let n = match read {
                    Ok(result) => result?,
                    Err(_) => {
                        println!("No data for 5 seconds, giving up");
                        break;
                    }
                };
                if n == 0 {
                    println!("Server closed the connection");
                    break;
                }

                pending.extend_from_slice(&buf[..n]);
                for frame in drain_frames(&mut pending) {
                    received += 1;
                    let full = frame.starts_with(shared::HIDE_CURSOR.as_bytes());
                    println!(
                        "Frame {}: {} bytes{}",
                        received,
                        frame.len(),
                        if full { " (full repaint)" } else { "" }
                    );
                    if keys.len() == 0 {
                        remaining = remaining.saturating_sub(1);
                    }
                }
            }
        }
    }

    println!("Received {} frames", received);
    Ok(())
}
