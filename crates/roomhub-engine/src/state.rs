#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default)]
pub struct LineStats {
    pub singles: u32,
    pub doubles: u32,
    pub triples: u32,
    pub tetrises: u32,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct Stats {
    pub time_played_seconds: f64,
    pub pieces_placed: u64,
    pub pieces_per_minute: f64,
    pub line_stats: LineStats,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct PieceView {
    pub kind: u8,
    pub shape: Vec<Vec<bool>>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct GhostView {
    pub shape: Vec<Vec<bool>>,
    pub x: i32,
    pub y: i32,
}

/// A read-only view of one tick of simulation state, shaped to match the
/// `player_game_state` wire message field names.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct State {
    pub board: Vec<Vec<u8>>,
    #[cfg_attr(feature = "serde", serde(rename = "nextPiece"))]
    pub next: PieceView,
    #[cfg_attr(feature = "serde", serde(rename = "holdPiece"))]
    pub hold: Option<PieceView>,
    #[cfg_attr(feature = "serde", serde(rename = "ghostPiece"))]
    pub ghost: GhostView,
    pub score: u64,
    pub lines: u32,
    pub level: u32,
    #[cfg_attr(feature = "serde", serde(rename = "gameOver"))]
    pub game_over: bool,
    pub paused: bool,
    pub stats: Stats,
}
