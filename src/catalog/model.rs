//! Catalog response model types
//!
//! Data structures and defensive parsers for the catalog endpoints. Missing
//! or mistyped fields are tolerated wherever a sensible default exists.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::RemoteServiceError;
use crate::lyrics::{LyricLine, sort_lines};

lazy_static! {
    static ref TARGET_ID: Regex = Regex::new(r#""DC_TARGETID"\s*:\s*"(?P<v>[^"]*)""#).unwrap();
    static ref NAME: Regex = Regex::new(r#""NAME"\s*:\s*"(?P<v>[^"]*)""#).unwrap();
    static ref ARTIST: Regex = Regex::new(r#""ARTIST"\s*:\s*"(?P<v>[^"]*)""#).unwrap();
    static ref ALBUM: Regex = Regex::new(r#""ALBUM"\s*:\s*"(?P<v>[^"]*)""#).unwrap();
    static ref DURATION: Regex = Regex::new(r#""DURATION"\s*:\s*"(?P<v>[^"]*)""#).unwrap();
}

/// A single search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub song_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl SearchHit {
    /// `title`, `title - artist` or `title - artist (album)`
    pub fn display_name(&self) -> String {
        match (&self.artist, &self.album) {
            (Some(artist), Some(album)) => format!("{} - {} ({})", self.title, artist, album),
            (Some(artist), None) => format!("{} - {}", self.title, artist),
            _ => self.title.clone(),
        }
    }
}

/// Read a field that may be encoded as a string or a number
fn str_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn f64_field(v: &Value, key: &str) -> Option<f64> {
    match v.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn hit_from_value(v: &Value, query: &str) -> Option<SearchHit> {
    let song_id = str_field(v, "DC_TARGETID")?;
    Some(SearchHit {
        song_id,
        title: str_field(v, "NAME").unwrap_or_else(|| query.to_string()),
        artist: str_field(v, "ARTIST"),
        album: str_field(v, "ALBUM"),
        duration_seconds: f64_field(v, "DURATION").filter(|d| *d > 0.0),
    })
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.name("v"))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a search response body
///
/// The search service answers with single-quoted pseudo-JSON. It is
/// normalised to double quotes and parsed; when that still fails, the first
/// hit is recovered by scanning for field markers.
pub fn to_search_hits(body: &str, query: &str) -> Result<Vec<SearchHit>, RemoteServiceError> {
    let text = body.replace('\'', "\"");

    if let Ok(value) = serde_json::from_str::<Value>(&text) {
        let hits: Vec<SearchHit> = value
            .get("abslist")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(|v| hit_from_value(v, query)).collect())
            .unwrap_or_default();
        return Ok(hits);
    }

    match capture(&TARGET_ID, &text) {
        Some(song_id) => Ok(vec![SearchHit {
            song_id,
            title: capture(&NAME, &text).unwrap_or_else(|| query.to_string()),
            artist: capture(&ARTIST, &text),
            album: capture(&ALBUM, &text),
            duration_seconds: capture(&DURATION, &text)
                .and_then(|d| d.parse().ok())
                .filter(|d: &f64| *d > 0.0),
        }]),
        None if text.trim().is_empty() => Ok(Vec::new()),
        None => Err(RemoteServiceError::InvalidResponse(
            "search response is neither JSON nor contains a song id".to_string(),
        )),
    }
}

/// Parse a play-url response body (a bare URL)
pub fn to_play_url(body: &str) -> Result<String, RemoteServiceError> {
    let url = body.trim();
    if url.starts_with("http") {
        Ok(url.to_string())
    } else {
        Err(RemoteServiceError::InvalidResponse(format!(
            "play url response is not a URL: {:.64}",
            url
        )))
    }
}

/// Parse a lyrics response body
///
/// Credit and blank lines are dropped; the result is sorted by timestamp.
pub fn to_lyrics(body: &str) -> Result<Vec<LyricLine>, RemoteServiceError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| RemoteServiceError::InvalidResponse(format!("lyrics JSON: {}", e)))?;

    let status = value.get("status").and_then(|s| match s {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    });
    if status != Some(200) {
        let msg = str_field(&value, "msg").unwrap_or_default();
        return Err(RemoteServiceError::InvalidResponse(format!(
            "lyrics status {:?}: {}",
            status, msg
        )));
    }

    let Some(list) = value
        .get("data")
        .and_then(|d| d.get("lrclist"))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    let mut lines: Vec<LyricLine> = list
        .iter()
        .filter_map(|item| {
            let text = str_field(item, "lineLyric")?;
            let time = f64_field(item, "time").unwrap_or(0.0);
            Some(LyricLine::new(time, text))
        })
        .filter(|line| !line.is_credit())
        .collect();

    sort_lines(&mut lines);
    Ok(lines)
}
