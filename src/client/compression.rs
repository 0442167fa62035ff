use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Extensions whose content is already compressed
const COMPRESSED_CONTAINERS: &[&str] = &["kmz", "zip", "gz"];

/// Bounded gzip workers.
///
/// Small payloads are compressed inline. Larger ones wait for one of a
/// fixed number of permits and run on the blocking pool; the permit is
/// released once the result is posted, whether compression worked or not.
#[derive(Clone)]
pub struct CompressionPool {
    workers: Arc<Semaphore>,
    size: usize,
    level: u32,
    threshold: usize,
}

impl CompressionPool {
    pub fn new(workers: usize, level: u32, threshold: usize) -> Self {
        let size = workers.max(1);
        Self {
            workers: Arc::new(Semaphore::new(size)),
            size,
            level: level.min(9),
            threshold,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    pub async fn compress(&self, data: Bytes) -> io::Result<Bytes> {
        if data.len() < self.threshold {
            return gzip(&data, self.level).map(Bytes::from);
        }

        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(io::Error::other)?;
        let level = self.level;
        tokio::task::spawn_blocking(move || {
            let result = gzip(&data, level);
            drop(permit);
            result
        })
        .await
        .map_err(io::Error::other)?
        .map(Bytes::from)
    }
}

pub fn gzip(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn gunzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

pub fn is_compressed_container(file_name: &str) -> bool {
    crate::utils::validation::file_extension(file_name)
        .map(|ext| COMPRESSED_CONTAINERS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Name a compressed payload travels under: `x.kml` becomes `x.kmz`.
pub fn compressed_name(file_name: &str) -> String {
    match crate::utils::validation::file_extension(file_name).as_deref() {
        Some("kml") => format!("{}kmz", &file_name[..file_name.len() - 3]),
        _ => format!("{}.gz", file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        b"<Placemark><name>Route</name></Placemark>\n"
            .iter()
            .cycle()
            .take(len)
            .copied()
            .collect()
    }

    #[tokio::test]
    async fn test_inline_and_pooled_paths_decompress() {
        let pool = CompressionPool::new(2, 6, 1024);

        let small = sample(100);
        let out = pool.compress(Bytes::from(small.clone())).await.unwrap();
        assert_eq!(gunzip(&out).unwrap(), small);

        let large = sample(64 * 1024);
        let out = pool.compress(Bytes::from(large.clone())).await.unwrap();
        assert!(out.len() < large.len());
        assert_eq!(gunzip(&out).unwrap(), large);
    }

    #[tokio::test]
    async fn test_workers_return_to_pool() {
        let pool = CompressionPool::new(2, 6, 0);
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                pool.compress(Bytes::from(sample(32 * 1024))).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(pool.available_workers(), pool.size());
    }

    #[test]
    fn test_container_detection_and_naming() {
        assert!(is_compressed_container("map.KMZ"));
        assert!(is_compressed_container("bundle.zip"));
        assert!(!is_compressed_container("map.kml"));
        assert!(!is_compressed_container("README"));

        assert_eq!(compressed_name("city.kml"), "city.kmz");
        assert_eq!(compressed_name("City.KML"), "City.kmz");
        assert_eq!(compressed_name("notes.txt"), "notes.txt.gz");
    }
}
