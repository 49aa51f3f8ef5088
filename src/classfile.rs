use anyhow::{Context, Result};

use crate::model::{ConstValue, Insn, InsnKind};
use crate::opcodes;

const MAGIC: u32 = 0xcafe_babe;

/// A class as the projection reader sees it: names, flags, member tables,
/// and per-method instruction/constant projections. Everything matching does
/// not need (operand bytes, local tables, annotations, line info) is dropped
/// while walking the file.
#[derive(Debug)]
pub(crate) struct RawClass {
    pub(crate) name: String,
    pub(crate) super_name: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) access: u16,
    pub(crate) methods: Vec<RawMethod>,
    pub(crate) fields: Vec<RawField>,
}

#[derive(Debug)]
pub(crate) struct RawMethod {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access: u16,
    pub(crate) exceptions: Vec<String>,
    pub(crate) code: Vec<Insn>,
    pub(crate) constants: Vec<ConstValue>,
}

#[derive(Debug)]
pub(crate) struct RawField {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access: u16,
    pub(crate) value: Option<ConstValue>,
}

#[derive(Clone, Debug)]
enum PoolEntry {
    Utf8(String),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    Str(u16),
    Ref { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    Other,
}

struct Pool {
    entries: Vec<PoolEntry>,
}

impl Pool {
    fn entry(&self, index: u16) -> Result<&PoolEntry> {
        self.entries
            .get(index as usize)
            .with_context(|| format!("constant pool index {index} out of range"))
    }

    fn utf8(&self, index: u16) -> Result<&str> {
        match self.entry(index)? {
            PoolEntry::Utf8(text) => Ok(text),
            other => anyhow::bail!("expected Utf8 at pool index {index}, found {other:?}"),
        }
    }

    fn class_name(&self, index: u16) -> Result<String> {
        match self.entry(index)? {
            PoolEntry::Class(name_index) => Ok(self.utf8(*name_index)?.to_string()),
            other => anyhow::bail!("expected Class at pool index {index}, found {other:?}"),
        }
    }

    fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.entry(index)? {
            PoolEntry::NameAndType { name, descriptor } => Ok((
                self.utf8(*name)?.to_string(),
                self.utf8(*descriptor)?.to_string(),
            )),
            other => anyhow::bail!("expected NameAndType at pool index {index}, found {other:?}"),
        }
    }

    fn member_ref(&self, index: u16) -> Result<(String, String, String)> {
        match self.entry(index)? {
            PoolEntry::Ref {
                class,
                name_and_type,
            } => {
                let owner = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((owner, name, descriptor))
            }
            other => anyhow::bail!("expected member ref at pool index {index}, found {other:?}"),
        }
    }

    /// Loadable constant for `ldc`/`ldc_w`/`ldc2_w`.
    fn loadable(&self, index: u16) -> Result<Option<ConstValue>> {
        let value = match self.entry(index)? {
            PoolEntry::Int(v) => Some(ConstValue::Int(*v)),
            PoolEntry::Float(v) => Some(ConstValue::Float(*v)),
            PoolEntry::Long(v) => Some(ConstValue::Long(*v)),
            PoolEntry::Double(v) => Some(ConstValue::Double(*v)),
            PoolEntry::Str(utf8) => Some(ConstValue::Str(self.utf8(*utf8)?.to_string())),
            PoolEntry::Class(utf8) => Some(ConstValue::Type(self.utf8(*utf8)?.to_string())),
            // MethodHandle/MethodType/Dynamic loads carry no matching signal.
            _ => None,
        };
        Ok(value)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .with_context(|| format!("truncated class file at offset {}", self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.bytes(2)?.try_into().expect("len")))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.bytes(4)?.try_into().expect("len")))
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }
}

pub(crate) fn parse_class(data: &[u8]) -> Result<RawClass> {
    let mut reader = Reader::new(data);
    if reader.u32()? != MAGIC {
        anyhow::bail!("not a class file (bad magic)");
    }
    reader.skip(4).context("truncated version header")?;

    let pool = parse_pool(&mut reader)?;

    let access = reader.u16()?;
    let this_class = reader.u16()?;
    let name = pool.class_name(this_class)?;
    let super_index = reader.u16()?;
    let super_name = if super_index == 0 {
        None
    } else {
        Some(pool.class_name(super_index)?)
    };

    let interface_count = reader.u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = reader.u16()?;
        interfaces.push(pool.class_name(index)?);
    }

    let field_count = reader.u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(parse_field(&mut reader, &pool)?);
    }

    let method_count = reader.u16()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(parse_method(&mut reader, &pool)?);
    }

    Ok(RawClass {
        name,
        super_name,
        interfaces,
        access,
        methods,
        fields,
    })
}

fn parse_pool(reader: &mut Reader<'_>) -> Result<Pool> {
    let count = reader.u16()?;
    // Index 0 is unused; long/double entries occupy two slots.
    let mut entries = vec![PoolEntry::Other; count as usize];
    let mut index = 1u16;
    while index < count {
        let tag = reader.u8()?;
        let mut wide = false;
        let entry = match tag {
            1 => {
                let len = reader.u16()? as usize;
                let bytes = reader.bytes(len)?;
                // Modified UTF-8 differs from UTF-8 only in surrogate and NUL
                // encodings; lossy decoding is sufficient for name matching.
                PoolEntry::Utf8(String::from_utf8_lossy(bytes).into_owned())
            }
            3 => PoolEntry::Int(reader.u32()? as i32),
            4 => PoolEntry::Float(f32::from_bits(reader.u32()?)),
            5 => {
                wide = true;
                let high = reader.u32()? as u64;
                let low = reader.u32()? as u64;
                PoolEntry::Long(((high << 32) | low) as i64)
            }
            6 => {
                wide = true;
                let high = reader.u32()? as u64;
                let low = reader.u32()? as u64;
                PoolEntry::Double(f64::from_bits((high << 32) | low))
            }
            7 => PoolEntry::Class(reader.u16()?),
            8 => PoolEntry::Str(reader.u16()?),
            9 | 10 | 11 => PoolEntry::Ref {
                class: reader.u16()?,
                name_and_type: reader.u16()?,
            },
            12 => PoolEntry::NameAndType {
                name: reader.u16()?,
                descriptor: reader.u16()?,
            },
            15 => {
                reader.skip(3)?;
                PoolEntry::Other
            }
            16 | 19 | 20 => {
                reader.skip(2)?;
                PoolEntry::Other
            }
            17 | 18 => {
                reader.skip(4)?;
                PoolEntry::Other
            }
            other => anyhow::bail!("unknown constant pool tag {other} at entry {index}"),
        };
        entries[index as usize] = entry;
        index += if wide { 2 } else { 1 };
    }
    Ok(Pool { entries })
}

fn parse_field(reader: &mut Reader<'_>, pool: &Pool) -> Result<RawField> {
    let access = reader.u16()?;
    let name = pool.utf8(reader.u16()?)?.to_string();
    let descriptor = pool.utf8(reader.u16()?)?.to_string();

    let mut value = None;
    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let attr_name = pool.utf8(reader.u16()?)?.to_string();
        let attr_len = reader.u32()? as usize;
        if attr_name == "ConstantValue" && attr_len == 2 {
            let index = reader.u16()?;
            value = pool.loadable(index)?;
        } else {
            reader.skip(attr_len)?;
        }
    }

    Ok(RawField {
        name,
        descriptor,
        access,
        value,
    })
}

fn parse_method(reader: &mut Reader<'_>, pool: &Pool) -> Result<RawMethod> {
    let access = reader.u16()?;
    let name = pool.utf8(reader.u16()?)?.to_string();
    let descriptor = pool.utf8(reader.u16()?)?.to_string();

    let mut exceptions = Vec::new();
    let mut code = Vec::new();
    let mut constants = Vec::new();

    let attribute_count = reader.u16()?;
    for _ in 0..attribute_count {
        let attr_name = pool.utf8(reader.u16()?)?.to_string();
        let attr_len = reader.u32()? as usize;
        match attr_name.as_str() {
            "Code" => {
                let attr = reader.bytes(attr_len)?;
                let (projected, loaded) = project_code(attr, pool)
                    .with_context(|| format!("failed to project bytecode of {name}{descriptor}"))?;
                code = projected;
                constants = loaded;
            }
            "Exceptions" => {
                let count = reader.u16()?;
                for _ in 0..count {
                    let index = reader.u16()?;
                    exceptions.push(pool.class_name(index)?);
                }
            }
            _ => reader.skip(attr_len)?,
        }
    }

    Ok(RawMethod {
        name,
        descriptor,
        access,
        exceptions,
        code,
        constants,
    })
}

/// Walk a Code attribute and keep only what matching needs: the opcode
/// stream, member/type references, and `ldc`-loaded constants.
fn project_code(attr: &[u8], pool: &Pool) -> Result<(Vec<Insn>, Vec<ConstValue>)> {
    let mut reader = Reader::new(attr);
    reader.skip(4).context("truncated Code header")?; // max_stack, max_locals
    let code_len = reader.u32()? as usize;
    let code = reader.bytes(code_len)?;

    let mut instructions = Vec::new();
    let mut constants = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let opcode = code[offset];
        let kind = match opcode {
            opcodes::LDC => {
                let index = *code
                    .get(offset + 1)
                    .with_context(|| format!("truncated ldc at offset {offset}"))?
                    as u16;
                if let Some(value) = pool.loadable(index)? {
                    constants.push(value);
                }
                InsnKind::Plain
            }
            opcodes::LDC_W | opcodes::LDC2_W => {
                let index = opcodes::read_u16(code, offset + 1)?;
                if let Some(value) = pool.loadable(index)? {
                    constants.push(value);
                }
                InsnKind::Plain
            }
            opcodes::GETSTATIC..=opcodes::PUTFIELD => {
                let index = opcodes::read_u16(code, offset + 1)?;
                let (owner, name, _descriptor) = pool.member_ref(index)?;
                InsnKind::Field { owner, name }
            }
            opcodes::INVOKEVIRTUAL..=opcodes::INVOKEINTERFACE => {
                let index = opcodes::read_u16(code, offset + 1)?;
                let (owner, name, descriptor) = pool.member_ref(index)?;
                InsnKind::Call {
                    owner,
                    name,
                    descriptor,
                }
            }
            opcodes::NEW
            | opcodes::ANEWARRAY
            | opcodes::CHECKCAST
            | opcodes::INSTANCEOF
            | opcodes::MULTIANEWARRAY => {
                let index = opcodes::read_u16(code, offset + 1)?;
                InsnKind::Type(pool.class_name(index)?)
            }
            _ => InsnKind::Plain,
        };
        instructions.push(Insn { opcode, kind });
        offset += opcodes::opcode_length(code, offset)?;
    }

    Ok((instructions, constants))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_class_data() {
        assert!(parse_class(b"nope").is_err());
    }

    #[test]
    fn projects_names_members_and_constants() {
        let data = testbytes::class_with_string_constant("com/example/App", "Database error");
        let class = parse_class(&data).expect("parse hand-built class");

        assert_eq!(class.name, "com/example/App");
        assert_eq!(class.super_name.as_deref(), Some("java/lang/Object"));
        assert!(class.interfaces.is_empty());
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.fields[0].name, "count");
        assert_eq!(class.fields[0].descriptor, "I");

        assert_eq!(class.methods.len(), 1);
        let method = &class.methods[0];
        assert_eq!(method.name, "run");
        assert_eq!(method.descriptor, "()V");
        assert_eq!(method.code.len(), 3);
        assert_eq!(
            method.constants,
            vec![ConstValue::Str("Database error".to_string())]
        );
    }

    #[test]
    fn code_projection_keeps_reference_details() {
        // The hand-built class has no member refs; assert the plain stream.
        let data = testbytes::class_with_string_constant("A", "hello world!");
        let class = parse_class(&data).expect("parse");
        let kinds: Vec<_> = class.methods[0]
            .code
            .iter()
            .map(|insn| insn.kind.clone())
            .collect();
        assert_eq!(kinds, vec![InsnKind::Plain, InsnKind::Plain, InsnKind::Plain]);
        assert_eq!(class.methods[0].code[2].opcode, opcodes::RETURN);
    }
}
