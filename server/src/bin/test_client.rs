//! Scripted protocol client for exercising a running server by hand.
//!
//! Listens on two session channels, registers through the rendezvous
//! channel, prints every board snapshot it receives, plays the given moves,
//! and disconnects.

use clap::Parser;
use shared::{
    encode_disconnect, encode_play, BoardSnapshot, ConnectRequest, BOARD_HEADER_LEN, OP_BOARD,
    OP_CONNECT, OP_DISCONNECT,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Rendezvous channel path of the server
    registry_path: PathBuf,
    /// Directory in which the client creates its session channels
    #[clap(short, long, default_value = "/tmp")]
    channel_dir: PathBuf,
    /// Manual moves to play, one letter per move (w/a/s/d)
    #[clap(short, long, default_value = "dd")]
    moves: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let pid = std::process::id();
    let request_path = args.channel_dir.join(format!("maze_req_{pid}"));
    let notify_path = args.channel_dir.join(format!("maze_notify_{pid}"));
    let _ = std::fs::remove_file(&request_path);
    let _ = std::fs::remove_file(&notify_path);
    let request_listener = UnixListener::bind(&request_path)?;
    let notify_listener = UnixListener::bind(&notify_path)?;

    // Register with the server
    let request = ConnectRequest {
        request_channel: request_path.display().to_string(),
        notify_channel: notify_path.display().to_string(),
    };
    let mut registry = UnixStream::connect(&args.registry_path).await?;
    registry.write_all(&request.encode()?).await?;
    drop(registry);
    println!("Connect request sent to {}", args.registry_path.display());

    // The server dials back on both channels
    let (mut request_channel, _) = request_listener.accept().await?;
    let (mut notify_channel, _) = notify_listener.accept().await?;

    let mut ack = [0u8; 2];
    notify_channel.read_exact(&mut ack).await?;
    if ack != [OP_CONNECT, 0] {
        println!("Unexpected connect response: {ack:?}");
        return Ok(());
    }
    println!("Session admitted");

    // Initial snapshot
    let board = read_board(&mut notify_channel).await?;
    print_board(&board);

    // Play the scripted moves
    for mv in args.moves.bytes() {
        println!("Playing move '{}'", mv as char);
        request_channel.write_all(&encode_play(mv)).await?;
        sleep(Duration::from_millis(200)).await;

        let board = read_board(&mut notify_channel).await?;
        print_board(&board);
        if board.game_over || board.victory {
            println!("Session finished");
            return Ok(());
        }
    }

    // Disconnect and wait for the acknowledgement
    println!("Sending disconnect request");
    request_channel.write_all(&encode_disconnect()).await?;
    loop {
        match read_frame(&mut notify_channel).await? {
            Frame::Board(board) => print_board(&board),
            Frame::Ack(OP_DISCONNECT, status) => {
                println!("Disconnect confirmed (status {status})");
                break;
            }
            Frame::Ack(opcode, status) => {
                println!("Unexpected ack: opcode {opcode}, status {status}");
            }
        }
    }

    println!("Test client finished");
    Ok(())
}

enum Frame {
    Board(BoardSnapshot),
    Ack(u8, u8),
}

async fn read_frame(stream: &mut UnixStream) -> Result<Frame, Box<dyn std::error::Error>> {
    let opcode = stream.read_u8().await?;
    match opcode {
        OP_BOARD => {
            let mut header = [0u8; BOARD_HEADER_LEN - 1];
            stream.read_exact(&mut header).await?;
            let width = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let height = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            let mut frame = Vec::with_capacity(BoardSnapshot::frame_len(width, height));
            frame.push(OP_BOARD);
            frame.extend_from_slice(&header);
            let mut cells = vec![0u8; (width.max(0) as usize) * (height.max(0) as usize)];
            stream.read_exact(&mut cells).await?;
            frame.extend_from_slice(&cells);

            Ok(Frame::Board(BoardSnapshot::decode(&frame)?))
        }
        OP_CONNECT | OP_DISCONNECT => {
            let status = stream.read_u8().await?;
            Ok(Frame::Ack(opcode, status))
        }
        other => Err(format!("unknown opcode {other} from server").into()),
    }
}

async fn read_board(stream: &mut UnixStream) -> Result<BoardSnapshot, Box<dyn std::error::Error>> {
    loop {
        if let Frame::Board(board) = read_frame(stream).await? {
            return Ok(board);
        }
    }
}

fn print_board(board: &BoardSnapshot) {
    println!(
        "Board {}x{} | tempo {}ms | score {} | victory {} | game over {}",
        board.width, board.height, board.tempo, board.score, board.victory, board.game_over
    );
    for row in board.cells.chunks(board.width.max(1) as usize) {
        println!("  {}", String::from_utf8_lossy(row));
    }
}
