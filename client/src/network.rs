//! UDP adapter between a [`Phone`] and the broadcast relay, plus the console
//! front end that turns stdin lines into intents.

use crate::error::ClientError;
use crate::phone::Phone;
use crate::snapshot::{Intent, Screen, Snapshot};
use log::{debug, error, info, warn};
use shared::{
    decode_packet, encode_packet, Difficulty, Packet, PlayerId, Settings, MAX_DATAGRAM_SIZE,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::interval;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

pub struct BusClient {
    socket: UdpSocket,
    relay_addr: SocketAddr,
    phone: Phone,
    started_at: Instant,
    tick_duration: Duration,
    joined: bool,
    last_screen: Option<Screen>,
}

impl BusClient {
    pub async fn new(
        relay_addr: &str,
        phone: Phone,
        tick_duration: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let relay_addr = relay_addr.parse()?;

        Ok(BusClient {
            socket,
            relay_addr,
            phone,
            started_at: Instant::now(),
            tick_duration,
            joined: false,
            last_screen: None,
        })
    }

    fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        let data = encode_packet(packet)?;
        self.socket.send_to(&data, self.relay_addr).await?;
        Ok(())
    }

    async fn join(&self) -> Result<(), ClientError> {
        info!("Joining relay at {}...", self.relay_addr);
        self.send_packet(&Packet::Join {
            peer_id: self.phone.id(),
            protocol_version: PROTOCOL_VERSION,
        })
        .await
    }

    /// Publishes everything the phone queued; nothing is sent before the
    /// relay accepted us
    async fn flush_outbox(&mut self) {
        if !self.joined {
            return;
        }
        for envelope in self.phone.drain_outbox() {
            let kind = envelope.message.kind();
            if let Err(e) = self.send_packet(&Packet::Publish { envelope }).await {
                error!("Failed to publish {}: {}", kind, e);
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet, claim_host: bool) {
        match packet {
            Packet::Joined { peer_id } => {
                if self.joined {
                    debug!("Duplicate join confirmation");
                    return;
                }
                info!("Joined relay as {}", peer_id);
                self.joined = true;
                let now_ms = self.now_ms();
                self.phone.start(now_ms, claim_host);
            }

            Packet::Deliver { envelope } => {
                let now_ms = self.now_ms();
                self.phone.handle_envelope(now_ms, envelope);
            }

            Packet::Rejected { reason } => {
                warn!("Relay rejected us: {}", reason);
                self.joined = false;
            }

            _ => {
                warn!("Unexpected packet type from relay");
            }
        }
    }

    fn render(&mut self) {
        let snapshot = self.phone.snapshot(self.now_ms());
        if self.last_screen == Some(snapshot.screen) {
            return;
        }
        self.last_screen = Some(snapshot.screen);
        for line in describe(&snapshot) {
            info!("{}", line);
        }
    }

    pub async fn run(&mut self, claim_host: bool) -> Result<(), Box<dyn std::error::Error>> {
        self.join().await?;

        let mut tick_interval = interval(self.tick_duration);
        let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match decode_packet(&buffer[0..len]) {
                            Ok(packet) => self.handle_packet(packet, claim_host),
                            Err(e) => warn!("Failed to decode packet: {}", e),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    let now_ms = self.now_ms();
                    self.phone.tick(now_ms);
                },

                _ = heartbeat_interval.tick() => {
                    let packet = if self.joined {
                        Packet::Heartbeat
                    } else {
                        Packet::Join {
                            peer_id: self.phone.id(),
                            protocol_version: PROTOCOL_VERSION,
                        }
                    };
                    if let Err(e) = self.send_packet(&packet).await {
                        error!("Error sending heartbeat: {}", e);
                    }
                },

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            let settings = self.phone.session().settings.current();
                            match parse_command(&line, &settings) {
                                Some(intent) => {
                                    let now_ms = self.now_ms();
                                    self.phone.handle_intent(now_ms, intent);
                                }
                                None => {
                                    if !line.trim().is_empty() {
                                        warn!("Unknown command '{}'", line.trim());
                                    }
                                }
                            }
                        }
                        Ok(None) => {
                            info!("Input closed");
                            break;
                        }
                        Err(e) => {
                            error!("Error reading input: {}", e);
                            break;
                        }
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
            }

            self.flush_outbox().await;
            self.render();
        }

        if self.joined {
            let _ = self.send_packet(&Packet::Leave).await;
        }
        Ok(())
    }
}

/// Parses one console line into an intent.
///
/// `1`-`4` answer by screen slot; `settings <category> <difficulty> <seconds>
/// <questions>` confirms new settings, missing fields keep `current`.
pub fn parse_command(line: &str, current: &Settings) -> Option<Intent> {
    let mut words = line.split_whitespace();
    let command = words.next()?.to_ascii_lowercase();

    let intent = match command.as_str() {
        "1" | "2" | "3" | "4" => Intent::SelectAnswer(command.parse::<usize>().ok()? - 1),
        "start" => Intent::StartGame,
        "reset" => Intent::ResetGame,
        "logout" => Intent::Logout,
        "rejoin" => Intent::Rejoin,
        "focus" => Intent::Focus,
        "blur" => Intent::Blur,
        "cancel" => Intent::CancelSettings,
        "host" => Intent::TransferHost(PlayerId(words.next()?.parse().ok()?)),
        "settings" => {
            let mut settings = current.clone();
            let Some(category) = words.next() else {
                return Some(Intent::OpenSettings);
            };
            settings.category = category.to_string();
            if let Some(difficulty) = words.next() {
                settings.difficulty = difficulty.parse::<Difficulty>().ok()?;
            }
            if let Some(seconds) = words.next() {
                settings.time_limit_ms = seconds.parse::<u64>().ok()?.checked_mul(1000)?;
            }
            if let Some(count) = words.next() {
                settings.num_questions = count.parse().ok()?;
            }
            Intent::ConfirmSettings(settings)
        }
        _ => return None,
    };
    Some(intent)
}

/// Console rendering of a snapshot
pub fn describe(snapshot: &Snapshot) -> Vec<String> {
    let mut lines = vec![format!(
        "[{:?}] player {} score {}{}",
        snapshot.screen,
        snapshot.player_id,
        snapshot.score,
        if snapshot.is_host { " (host)" } else { "" }
    )];

    match snapshot.screen {
        Screen::Question | Screen::Submitted | Screen::Results => {
            if let Some(question) = &snapshot.question {
                lines.push(format!(
                    "Q{}/{}: {} ({}s left)",
                    question.index + 1,
                    question.total,
                    question.prompt,
                    question.remaining_ms / 1000
                ));
                for (slot, label) in question.slots.iter().enumerate() {
                    if let Some(label) = label {
                        let marker = if question.correct_slot == Some(slot) { "*" } else { " " };
                        lines.push(format!("  {}{} {}", marker, slot + 1, label));
                    }
                }
            }
        }
        Screen::Leaderboard | Screen::Ended => {
            for row in &snapshot.leaderboard {
                lines.push(format!(
                    "  {}. {} {}{}",
                    row.rank,
                    row.name,
                    row.score,
                    if row.is_self { " <" } else { "" }
                ));
            }
        }
        Screen::Lobby | Screen::Settings => {
            let settings = snapshot.settings_draft.as_ref().unwrap_or(&snapshot.settings);
            lines.push(format!(
                "{} / {} / {}s / {} questions, {} players",
                settings.category,
                settings.difficulty,
                settings.time_limit_ms / 1000,
                settings.num_questions,
                snapshot.players_in_world
            ));
        }
        Screen::Interstitial | Screen::OptedOut => {}
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer_slots() {
        let settings = Settings::default();
        assert_eq!(parse_command("1", &settings), Some(Intent::SelectAnswer(0)));
        assert_eq!(parse_command(" 4 ", &settings), Some(Intent::SelectAnswer(3)));
        assert_eq!(parse_command("5", &settings), None);
        assert_eq!(parse_command("", &settings), None);
    }

    #[test]
    fn test_parse_settings() {
        let current = Settings::default();
        assert_eq!(parse_command("settings", &current), Some(Intent::OpenSettings));

        match parse_command("settings science hard 20 3", &current) {
            Some(Intent::ConfirmSettings(settings)) => {
                assert_eq!(settings.category, "science");
                assert_eq!(settings.difficulty, Difficulty::Hard);
                assert_eq!(settings.time_limit_ms, 20_000);
                assert_eq!(settings.num_questions, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(parse_command("settings science extreme", &current), None);
        assert_eq!(parse_command("settings science hard 18446744073709552", &current), None);
    }

    #[test]
    fn test_parse_host_transfer() {
        let settings = Settings::default();
        assert_eq!(
            parse_command("host 7", &settings),
            Some(Intent::TransferHost(PlayerId(7)))
        );
        assert_eq!(parse_command("host", &settings), None);
    }

    fn phone(id: u32) -> Phone {
        Phone::new(
            PlayerId(id),
            "console",
            crate::config::SessionConfig::default(),
            crate::questions::QuestionBank::builtin(),
        )
    }

    #[tokio::test]
    async fn test_bus_client_creation() {
        let tick = Duration::from_millis(50);
        assert!(BusClient::new("127.0.0.1:9", phone(1), tick).await.is_ok());
        assert!(BusClient::new("not an address", phone(2), tick).await.is_err());
    }
}
