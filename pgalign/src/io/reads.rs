use anyhow::{anyhow, Result};
use std::io::BufRead;

/// FASTA 或 FASTQ 中的一条序列；FASTA 记录没有质量值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
    pub qual: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Fasta,
    Fastq,
}

/// 按首个非空行自动识别格式：`>` 为 FASTA（允许多行序列），`@` 为四行 FASTQ
pub struct SeqReader<R: BufRead> {
    reader: R,
    buf: String,
    done: bool,
    format: Option<Format>,
    peek_header: Option<String>,
}

fn split_header(header: &str) -> (String, Option<String>) {
    let mut parts = header.splitn(2, char::is_whitespace);
    let id = parts.next().unwrap_or("").to_string();
    let desc = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    (id, desc)
}

impl<R: BufRead> SeqReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), done: false, format: None, peek_header: None }
    }

    fn read_line(&mut self) -> Result<bool> {
        self.buf.clear();
        let n = self.reader.read_line(&mut self.buf)?;
        Ok(n > 0)
    }

    pub fn next_record(&mut self) -> Result<Option<SeqRecord>> {
        if self.done {
            return Ok(None);
        }
        match self.format {
            Some(Format::Fasta) => self.next_fasta(),
            Some(Format::Fastq) => self.next_fastq(),
            None => {
                // skip leading blank lines
                loop {
                    if !self.read_line()? {
                        self.done = true;
                        return Ok(None);
                    }
                    if !self.buf.trim().is_empty() {
                        break;
                    }
                }
                if let Some(h) = self.buf.strip_prefix('>') {
                    self.peek_header = Some(h.trim().to_string());
                    self.format = Some(Format::Fasta);
                    self.next_fasta()
                } else if let Some(h) = self.buf.strip_prefix('@') {
                    self.peek_header = Some(h.trim_end().to_string());
                    self.format = Some(Format::Fastq);
                    self.next_fastq()
                } else {
                    Err(anyhow!("input is neither FASTA ('>') nor FASTQ ('@')"))
                }
            }
        }
    }

    fn next_fasta(&mut self) -> Result<Option<SeqRecord>> {
        let header = if let Some(h) = self.peek_header.take() {
            h
        } else {
            loop {
                if !self.read_line()? {
                    self.done = true;
                    return Ok(None);
                }
                if let Some(h) = self.buf.strip_prefix('>') {
                    break h.trim().to_string();
                }
            }
        };
        let (id, desc) = split_header(&header);

        let mut seq: Vec<u8> = Vec::new();
        loop {
            if !self.read_line()? {
                self.done = true;
                break;
            }
            if let Some(h) = self.buf.strip_prefix('>') {
                self.peek_header = Some(h.trim().to_string());
                break;
            }
            for &b in self.buf.as_bytes() {
                match b {
                    b'\n' | b'\r' | b' ' | b'\t' => {}
                    _ => seq.push(b.to_ascii_uppercase()),
                }
            }
        }

        Ok(Some(SeqRecord { id, desc, seq, qual: None }))
    }

    fn next_fastq(&mut self) -> Result<Option<SeqRecord>> {
        let header = if let Some(h) = self.peek_header.take() {
            h
        } else {
            loop {
                if !self.read_line()? {
                    self.done = true;
                    return Ok(None);
                }
                if !self.buf.trim().is_empty() {
                    break;
                }
            }
            match self.buf.strip_prefix('@') {
                Some(h) => h.trim_end().to_string(),
                None => return Err(anyhow!("FASTQ header not starting with '@'")),
            }
        };
        let (id, desc) = split_header(&header);

        if !self.read_line()? {
            return Err(anyhow!("unexpected EOF after header of '{}'", id));
        }
        let seq: Vec<u8> = self.buf.trim_end().bytes().map(|b| b.to_ascii_uppercase()).collect();

        if !self.read_line()? || !self.buf.starts_with('+') {
            return Err(anyhow!("missing '+' line in record '{}'", id));
        }

        if !self.read_line()? {
            return Err(anyhow!("missing quality line in record '{}'", id));
        }
        let qual = self.buf.trim_end().as_bytes().to_vec();
        if qual.len() != seq.len() {
            return Err(anyhow!("seq/qual length mismatch in record '{}'", id));
        }

        Ok(Some(SeqRecord { id, desc, seq, qual: Some(qual) }))
    }
}

impl<R: BufRead> Iterator for SeqReader<R> {
    type Item = Result<SeqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
