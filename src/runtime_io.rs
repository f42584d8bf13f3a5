use std::collections::VecDeque;

/// Abstraction over runtime I/O so program output is capturable in tests.
pub trait RuntimeIo {
    fn write_line(&mut self, s: &str);
    fn read_line(&mut self) -> Result<String, String>;
}

/// Default I/O that talks to process stdout/stdin (CLI use).
pub struct StdIo;

impl RuntimeIo for StdIo {
    fn write_line(&mut self, s: &str) {
        println!("{}", s);
    }

    fn read_line(&mut self) -> Result<String, String> {
        use std::io::BufRead;
        let mut buf = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut buf)
            .map_err(|e| e.to_string())?;
        Ok(buf.trim_end_matches(['\n', '\r']).to_string())
    }
}

/// Buffer-based I/O for tests: caller pushes input, output accumulates.
#[derive(Default)]
pub struct BufferIo {
    output: String,
    input: VecDeque<String>,
}

impl BufferIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input_line<S: Into<String>>(&mut self, line: S) {
        self.input.push_back(line.into());
    }

    pub fn take_output(self) -> String {
        self.output
    }
}

impl RuntimeIo for BufferIo {
    fn write_line(&mut self, s: &str) {
        self.output.push_str(s);
        self.output.push('\n');
    }

    fn read_line(&mut self) -> Result<String, String> {
        self.input
            .pop_front()
            .ok_or_else(|| "no input available".to_string())
    }
}
