//! 定长记录二进制日志
//!
//! 实时回路每周期写一条记录（关节位置、指令力矩），格式越简单越好：
//! 没有文件头，文件就是定长记录的裸拼接，小端字节序。一个文件只放
//! 一种记录类型，类型由读写两端的类型参数约定。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

use crate::ToolsError;

/// 定长二进制记录
pub trait Record: Sized {
    /// 单条记录的字节数
    const SIZE: usize;

    /// 编码到 `buf[..Self::SIZE]`
    fn write_to(&self, buf: &mut [u8]);

    /// 从 `buf[..Self::SIZE]` 解码
    fn read_from(buf: &[u8]) -> Self;
}

impl Record for f64 {
    const SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[..8]);
        f64::from_le_bytes(bytes)
    }
}

impl Record for i32 {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&buf[..4]);
        i32::from_le_bytes(bytes)
    }
}

impl<const N: usize> Record for [f64; N] {
    const SIZE: usize = 8 * N;

    fn write_to(&self, buf: &mut [u8]) {
        for (i, value) in self.iter().enumerate() {
            buf[i * 8..(i + 1) * 8].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut values = [0.0f64; N];
        for (i, value) in values.iter_mut().enumerate() {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[i * 8..(i + 1) * 8]);
            *value = f64::from_le_bytes(bytes);
        }
        values
    }
}

/// 追加式日志写入端
pub struct LogWriter<T: Record> {
    writer: BufWriter<File>,
    count: u64,
    buf: Vec<u8>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Record> LogWriter<T> {
    /// 创建（或截断）日志文件
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ToolsError> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            count: 0,
            buf: vec![0u8; T::SIZE],
            _marker: PhantomData,
        })
    }

    /// 追加一条记录
    pub fn push(&mut self, record: &T) -> Result<(), ToolsError> {
        record.write_to(&mut self.buf);
        self.writer.write_all(&self.buf)?;
        self.count += 1;
        Ok(())
    }

    /// 已写入的记录数
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 把缓冲落盘
    pub fn flush(&mut self) -> Result<(), ToolsError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// 顺序读取端
pub struct LogReader<T: Record> {
    reader: BufReader<File>,
    remaining: u64,
    buf: Vec<u8>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> LogReader<T> {
    /// 打开日志文件
    ///
    /// 文件长度必须是记录长度的整数倍，末尾的半条记录按格式错误处理。
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ToolsError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let record_size = T::SIZE as u64;
        if len % record_size != 0 {
            return Err(ToolsError::TruncatedRecord {
                offset: len - len % record_size,
            });
        }
        Ok(Self {
            reader: BufReader::new(file),
            remaining: len / record_size,
            buf: vec![0u8; T::SIZE],
            _marker: PhantomData,
        })
    }

    /// 剩余的记录数
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// 读下一条记录；读完返回 `ToolsError::Exhausted`
    pub fn next_record(&mut self) -> Result<T, ToolsError> {
        if self.remaining == 0 {
            return Err(ToolsError::Exhausted);
        }
        self.reader.read_exact(&mut self.buf)?;
        self.remaining -= 1;
        Ok(T::read_from(&self.buf))
    }

    /// 读出剩余所有记录
    pub fn read_all(&mut self) -> Result<Vec<T>, ToolsError> {
        let mut records = Vec::with_capacity(self.remaining as usize);
        while self.remaining > 0 {
            records.push(self.next_record()?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::io::Write as _;

    #[test]
    fn test_f64_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalar.bin");

        let mut writer = LogWriter::<f64>::create(&path).unwrap();
        let mut rng = rand::thread_rng();
        let samples: Vec<f64> = (0..100).map(|_| rng.gen_range(-10.0..10.0)).collect();
        for s in &samples {
            writer.push(s).unwrap();
        }
        assert_eq!(writer.count(), 100);
        writer.flush().unwrap();

        let mut reader = LogReader::<f64>::open(&path).unwrap();
        assert_eq!(reader.remaining(), 100);
        assert_eq!(reader.read_all().unwrap(), samples);
    }

    #[test]
    fn test_array_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("joints.bin");

        let mut writer = LogWriter::<[f64; 7]>::create(&path).unwrap();
        writer.push(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
        writer.push(&[1.0; 7]).unwrap();
        writer.flush().unwrap();

        let mut reader = LogReader::<[f64; 7]>::open(&path).unwrap();
        let first = reader.next_record().unwrap();
        assert_eq!(first[3], 0.3);
        let second = reader.next_record().unwrap();
        assert_eq!(second, [1.0; 7]);
    }

    #[test]
    fn test_exhausted_never_returns_stale_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.bin");

        let mut writer = LogWriter::<i32>::create(&path).unwrap();
        writer.push(&42).unwrap();
        writer.flush().unwrap();

        let mut reader = LogReader::<i32>::open(&path).unwrap();
        assert_eq!(reader.next_record().unwrap(), 42);
        assert!(matches!(reader.next_record(), Err(ToolsError::Exhausted)));
        // 再读还是 Exhausted，不会重放旧数据
        assert!(matches!(reader.next_record(), Err(ToolsError::Exhausted)));
    }

    #[test]
    fn test_truncated_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.bin");

        {
            let mut file = File::create(&path).unwrap();
            // 一条半 f64 记录
            file.write_all(&[0u8; 12]).unwrap();
        }

        match LogReader::<f64>::open(&path) {
            Err(ToolsError::TruncatedRecord { offset: 8 }) => {},
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn test_empty_file_is_just_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        File::create(&path).unwrap();

        let mut reader = LogReader::<f64>::open(&path).unwrap();
        assert_eq!(reader.remaining(), 0);
        assert!(matches!(reader.next_record(), Err(ToolsError::Exhausted)));
    }
}
