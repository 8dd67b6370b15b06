// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 区域存储 (Zone Store)
//!
//! 区域列表以 JSON 数组保存在共享文件中, 每个处理周期重新读取。
//! 文件不存在或无法解析时视为空列表。

pub mod membership;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ZoneError;

pub use membership::{count_zones, is_match, DEFAULT_OVERLAP_THRESHOLD};

/// 矩形区域 (工作分辨率像素坐标)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Zone {
    /// 创建区域, 坐标规整为 x1≤x2, y1≤y2
    pub fn normalized(name: impl Into<String>, x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            name: name.into(),
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }
}

/// 解析坐标: 接受数字或数字字符串
pub fn coordinate_from_json(value: &Value) -> Result<i32, ZoneError> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| ZoneError::InvalidCoordinates(value.to_string()))
}

pub struct ZoneStore {
    path: PathBuf,
    // 串行化 读-改-写
    write_lock: Mutex<()>,
    // 文件缺失只告警一次, 文件出现后复位
    missing_reported: AtomicBool,
}

impl ZoneStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            missing_reported: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取区域列表
    pub fn load(&self) -> Vec<Zone> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => {
                self.missing_reported.store(false, Ordering::Relaxed);
                json
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.missing_reported.swap(true, Ordering::Relaxed) {
                    debug!("📝 区域文件不存在: {}", self.path.display());
                } else {
                    warn!("📝 区域文件不存在: {}", self.path.display());
                }
                return Vec::new();
            }
            Err(e) => {
                warn!("⚠️  区域文件读取失败 {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&json) {
            Ok(zones) => zones,
            Err(e) => {
                warn!("⚠️  区域文件解析失败 {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// 保存区域列表 (缩进2格)
    pub fn save(&self, zones: &[Zone]) -> Result<(), ZoneError> {
        let json = serde_json::to_string_pretty(zones)?;
        fs::write(&self.path, json)?;
        debug!("💾 {} 个区域已保存到 {}", zones.len(), self.path.display());
        Ok(())
    }

    pub fn list(&self) -> Vec<Zone> {
        self.load()
    }

    /// 新增区域; 未命名时使用 "Zone N"
    pub fn add(&self, name: Option<String>, coords: [i32; 4]) -> Result<Vec<Zone>, ZoneError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut zones = self.load();

        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Zone {}", zones.len() + 1));
        let [x1, y1, x2, y2] = coords;
        let zone = Zone::normalized(name, x1, y1, x2, y2);
        info!(
            "➕ 新增区域 {} [{}, {}, {}, {}]",
            zone.name, zone.x1, zone.y1, zone.x2, zone.y2
        );

        zones.push(zone);
        self.save(&zones)?;
        Ok(zones)
    }

    /// 按序号删除区域
    pub fn delete(&self, index: usize) -> Result<Vec<Zone>, ZoneError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut zones = self.load();
        if index >= zones.len() {
            return Err(ZoneError::InvalidIndex(index));
        }

        let removed = zones.remove(index);
        info!("➖ 删除区域 {}", removed.name);
        self.save(&zones)?;
        Ok(zones)
    }

    pub fn clear(&self) -> Result<(), ZoneError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.save(&[])?;
        info!("🧹 区域已清空");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, ZoneStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zones.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_missing_file_warning_is_not_repeated() {
        let (_dir, store) = store();
        assert!(!store.missing_reported.load(Ordering::Relaxed));
        assert!(store.load().is_empty());
        assert!(store.missing_reported.load(Ordering::Relaxed));
        assert!(store.load().is_empty());
        assert!(store.missing_reported.load(Ordering::Relaxed));

        store.add(Some("A".into()), [0, 0, 1, 1]).unwrap();
        assert!(!store.missing_reported.load(Ordering::Relaxed));

        fs::remove_file(store.path()).unwrap();
        assert!(store.load().is_empty());
        assert!(store.missing_reported.load(Ordering::Relaxed));
    }

    #[test]
    fn test_malformed_file_is_empty() {
        let (_dir, store) = store();
        fs::write(store.path(), "[{\"name\": 1}").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_add_normalizes_and_names() {
        let (_dir, store) = store();
        let zones = store.add(None, [100, 200, 10, 20]).unwrap();
        assert_eq!(zones, vec![Zone::normalized("Zone 1", 10, 20, 100, 200)]);
        assert_eq!(zones[0].x1, 10);
        assert_eq!(zones[0].y2, 200);

        let zones = store.add(Some("door".into()), [0, 0, 5, 5]).unwrap();
        assert_eq!(zones[1].name, "door");
        let zones = store.add(Some(String::new()), [0, 0, 5, 5]).unwrap();
        assert_eq!(zones[2].name, "Zone 3");
        assert_eq!(store.load().len(), 3);
    }

    #[test]
    fn test_file_is_pretty_printed() {
        let (_dir, store) = store();
        store.add(Some("A".into()), [0, 0, 1, 1]).unwrap();
        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\n    \"name\": \"A\""));
    }

    #[test]
    fn test_delete_and_clear() {
        let (_dir, store) = store();
        store.add(Some("A".into()), [0, 0, 1, 1]).unwrap();
        store.add(Some("B".into()), [0, 0, 1, 1]).unwrap();

        assert!(matches!(store.delete(5), Err(ZoneError::InvalidIndex(5))));
        let zones = store.delete(0).unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "B");

        store.clear().unwrap();
        assert!(store.load().is_empty());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");
    }

    #[test]
    fn test_coordinate_parsing() {
        assert_eq!(coordinate_from_json(&json!(12)).unwrap(), 12);
        assert_eq!(coordinate_from_json(&json!(12.9)).unwrap(), 12);
        assert_eq!(coordinate_from_json(&json!("34")).unwrap(), 34);
        assert!(coordinate_from_json(&json!("abc")).is_err());
        assert!(coordinate_from_json(&json!(null)).is_err());
        assert!(coordinate_from_json(&json!([1])).is_err());
    }
}
