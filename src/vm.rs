//! The stack-based virtual machine (spec §4.5): loads an [`Image`] into a
//! single flat byte buffer and interprets it until `Hlt` or a runtime
//! error.

use std::io::{Read, Write};

use crate::image::{Image, Opcode, INSTR_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeError {
    DivisionByZero,
    ModuloByZero,
    InputExhausted,
    IllegalOpcode(u8),
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::DivisionByZero => write!(f, "division by zero"),
            RuntimeError::ModuloByZero => write!(f, "modulo by zero"),
            RuntimeError::InputExhausted => write!(f, "input stream exhausted"),
            RuntimeError::IllegalOpcode(b) => write!(f, "illegal opcode byte {b}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Owns a single byte buffer (spec §4.5: "a single byte buffer sized to
/// `constEnd`"), the stack pointer, and the instruction pointer. `R`/`W`
/// are the VM's input/output streams, defaulting to stdin/stdout but
/// substitutable in tests.
pub struct Vm<R, W> {
    mem: Vec<u8>,
    sp: u32,
    ip: u32,
    stack_end: u32,
    halted: bool,
    input: R,
    output: W,
}

impl<R: Read, W: Write> Vm<R, W> {
    /// Serializes `image` into the VM's memory and sets `sp = 0`,
    /// `ip = stackEnd`, `halted = false` (spec §4.5 `loadImage`).
    pub fn new(image: Image, input: R, output: W) -> Self {
        let stack_end = image.stack_end();
        let mem = image.serialize();
        Self {
            mem,
            sp: 0,
            ip: stack_end,
            stack_end,
            halted: false,
            input,
            output,
        }
    }

    pub fn sp(&self) -> u32 {
        self.sp
    }

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Renders the loaded program using the same `<address>\t<opcode>
    /// <operand>` format and opcode-name table the decoder uses, so
    /// disassembly can never drift from execution semantics.
    pub fn disassemble(image: &Image) -> String {
        image.disassemble()
    }

    pub fn run_to_completion(&mut self) -> Result<(), RuntimeError> {
        while !self.halted {
            self.step()?;
        }
        Ok(())
    }

    /// Executes exactly one instruction. Returns `Ok(true)` if execution
    /// should continue, `Ok(false)` once `Hlt` has run.
    pub fn step(&mut self) -> Result<bool, RuntimeError> {
        if self.halted {
            return Ok(false);
        }
        let ip = self.ip as usize;
        let opcode_byte = self.mem[ip];
        let operand = i32::from_le_bytes(self.mem[ip + 1..ip + 5].try_into().unwrap());
        let opcode =
            Opcode::from_byte(opcode_byte).ok_or(RuntimeError::IllegalOpcode(opcode_byte))?;
        self.ip += INSTR_SIZE;

        match opcode {
            Opcode::Alloca => {
                self.sp = (self.sp as i64 + operand as i64) as u32;
                debug_assert!(self.sp <= self.stack_end);
            }
            Opcode::PushVal => self.push(operand),
            Opcode::PushAddr => {
                let v = self.read_i32(operand as u32);
                self.push(v);
            }
            Opcode::PopVal => {
                self.pop();
            }
            Opcode::PopAddr => {
                let v = self.pop();
                self.write_i32(operand as u32, v);
            }
            Opcode::Add => self.binop(i32::wrapping_add),
            Opcode::Sub => self.binop(i32::wrapping_sub),
            Opcode::Mul => self.binop(i32::wrapping_mul),
            Opcode::Div => {
                let b = self.pop();
                let a = self.pop();
                if b == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                self.push(a.wrapping_div(b));
            }
            Opcode::Mod => {
                let b = self.pop();
                let a = self.pop();
                if b == 0 {
                    return Err(RuntimeError::ModuloByZero);
                }
                self.push(a.wrapping_rem(b));
            }
            Opcode::CmpL => self.binop(|a, b| (a < b) as i32),
            Opcode::CmpG => self.binop(|a, b| (a > b) as i32),
            Opcode::CmpLe => self.binop(|a, b| (a <= b) as i32),
            Opcode::CmpGe => self.binop(|a, b| (a >= b) as i32),
            Opcode::CmpEq => self.binop(|a, b| (a == b) as i32),
            Opcode::CmpNe => self.binop(|a, b| (a != b) as i32),
            Opcode::And => self.binop(|a, b| ((a != 0) && (b != 0)) as i32),
            Opcode::Or => self.binop(|a, b| ((a != 0) || (b != 0)) as i32),
            Opcode::Not => {
                let a = self.pop();
                self.push((a == 0) as i32);
            }
            Opcode::In => {
                let v = self.read_int()?;
                self.push(v);
            }
            Opcode::Out => {
                let v = self.pop();
                let _ = writeln!(self.output, "{v}");
            }
            Opcode::Jmp => self.ip = operand as u32,
            Opcode::JmpTrue => {
                let v = self.pop();
                if v != 0 {
                    self.ip = operand as u32;
                }
            }
            Opcode::JmpFalse => {
                let v = self.pop();
                if v == 0 {
                    self.ip = operand as u32;
                }
            }
            Opcode::Hlt => {
                self.halted = true;
                return Ok(false);
            }
        }
        Ok(!self.halted)
    }

    fn binop(&mut self, f: impl Fn(i32, i32) -> i32) {
        let b = self.pop();
        let a = self.pop();
        self.push(f(a, b));
    }

    fn push(&mut self, v: i32) {
        let sp = self.sp as usize;
        self.mem[sp..sp + 4].copy_from_slice(&v.to_le_bytes());
        self.sp += 4;
    }

    fn pop(&mut self) -> i32 {
        self.sp -= 4;
        self.read_i32(self.sp)
    }

    fn read_i32(&self, addr: u32) -> i32 {
        let a = addr as usize;
        i32::from_le_bytes(self.mem[a..a + 4].try_into().unwrap())
    }

    fn write_i32(&mut self, addr: u32, v: i32) {
        let a = addr as usize;
        self.mem[a..a + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Reads one whitespace-delimited decimal integer from the input
    /// stream (spec §4.5); an exhausted stream halts with a runtime error.
    fn read_int(&mut self) -> Result<i32, RuntimeError> {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Err(RuntimeError::InputExhausted),
                Ok(_) if (byte[0] as char).is_whitespace() => continue,
                Ok(_) => break,
                Err(_) => return Err(RuntimeError::InputExhausted),
            }
        }
        let mut text = vec![byte[0]];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => break,
                Ok(_) if (byte[0] as char).is_whitespace() => break,
                Ok(_) => text.push(byte[0]),
                Err(_) => break,
            }
        }
        std::str::from_utf8(&text)
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or(RuntimeError::InputExhausted)
    }
}
