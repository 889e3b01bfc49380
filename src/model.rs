use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKetercapaian {
    Tercapai,
    SebagianTercapai,
    TidakTercapai,
}

impl StatusKetercapaian {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tercapai => "TERCAPAI",
            Self::SebagianTercapai => "SEBAGIAN_TERCAPAI",
            Self::TidakTercapai => "TIDAK_TERCAPAI",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TERCAPAI" => Some(Self::Tercapai),
            "SEBAGIAN_TERCAPAI" => Some(Self::SebagianTercapai),
            "TIDAK_TERCAPAI" => Some(Self::TidakTercapai),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusAbsensi {
    Hadir,
    Sakit,
    Izin,
    Alpa,
}

impl StatusAbsensi {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hadir => "HADIR",
            Self::Sakit => "SAKIT",
            Self::Izin => "IZIN",
            Self::Alpa => "ALPA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HADIR" => Some(Self::Hadir),
            "SAKIT" => Some(Self::Sakit),
            "IZIN" => Some(Self::Izin),
            "ALPA" => Some(Self::Alpa),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagSiswa {
    PerluRemedial,
    PerluPengayaan,
    MasalahPerilaku,
    RujukBk,
}

impl TagSiswa {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerluRemedial => "PERLU_REMEDIAL",
            Self::PerluPengayaan => "PERLU_PENGAYAAN",
            Self::MasalahPerilaku => "MASALAH_PERILAKU",
            Self::RujukBk => "RUJUK_BK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PERLU_REMEDIAL" => Some(Self::PerluRemedial),
            "PERLU_PENGAYAAN" => Some(Self::PerluPengayaan),
            "MASALAH_PERILAKU" => Some(Self::MasalahPerilaku),
            "RUJUK_BK" => Some(Self::RujukBk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Guru,
}

/// Semester implied by the calendar: June onwards opens semester 1 of a new
/// academic year, January through May is semester 2.
pub fn default_semester(today: NaiveDate) -> i64 {
    if today.month() >= 6 {
        1
    } else {
        2
    }
}

/// Always `"{year}/{year+1}"` of the current calendar year, regardless of
/// which semester `default_semester` picks.
pub fn default_tahun_ajaran(today: NaiveDate) -> String {
    format!("{}/{}", today.year(), today.year() + 1)
}

/// Accepts `YYYY/YYYY` where the second year follows the first.
pub fn is_valid_tahun_ajaran(s: &str) -> bool {
    let Some((a, b)) = s.split_once('/') else {
        return false;
    };
    if a.len() != 4 || b.len() != 4 || !all_digits(a) || !all_digits(b) {
        return false;
    }
    match (a.parse::<i32>(), b.parse::<i32>()) {
        (Ok(start), Ok(end)) => end == start + 1,
        _ => false,
    }
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// Strict `YYYY-MM-DD` with a four-digit year.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 10 || !s.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// `HH:MM`, 24h clock.
pub fn is_valid_jam(s: &str) -> bool {
    let Some((h, m)) = s.split_once(':') else {
        return false;
    };
    if h.len() != 2 || m.len() != 2 || !all_digits(h) || !all_digits(m) {
        return false;
    }
    matches!((h.parse::<u32>(), m.parse::<u32>()), (Ok(hh), Ok(mm)) if hh < 24 && mm < 60)
}
