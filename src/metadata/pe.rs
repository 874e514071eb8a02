//! PE/COFF container: just enough of the image to reach the CLI header and map RVAs

use super::cursor::ByteReader;
use super::error::{MetadataError, Result};

const DOS_MAGIC: &[u8; 2] = b"MZ";
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;
const CLI_HEADER_DIRECTORY: usize = 14;
const SECTION_HEADER_SIZE: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDirectory {
    pub rva: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub raw_size: u32,
    pub raw_offset: u32,
}

impl Section {
    fn contains(&self, rva: u32) -> bool {
        let extent = self.virtual_size.max(self.raw_size);
        rva >= self.virtual_address && u64::from(rva) < u64::from(self.virtual_address) + u64::from(extent)
    }
}

/// The CLI (COR20) header of a managed image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliHeader {
    pub runtime_major: u16,
    pub runtime_minor: u16,
    pub metadata: DataDirectory,
    pub flags: u32,
    pub entry_point_token: u32,
}

#[derive(Debug)]
pub struct PeImage<'a> {
    data: &'a [u8],
    pub is_pe32_plus: bool,
    pub sections: Vec<Section>,
    pub cli_header: CliHeader,
}

impl<'a> PeImage<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(MetadataError::Empty);
        }
        if data.len() < 0x40 || &data[..2] != DOS_MAGIC {
            return Err(MetadataError::NotPortableExecutable(
                "missing MZ header".to_string(),
            ));
        }

        let mut reader = ByteReader::at(data, 0x3C)?;
        let pe_offset = reader.u32("e_lfanew")? as usize;
        reader
            .seek(pe_offset)
            .map_err(|_| MetadataError::NotPortableExecutable("e_lfanew points past end of file".to_string()))?;
        if reader.bytes(4, "PE signature")? != PE_SIGNATURE {
            return Err(MetadataError::NotPortableExecutable(
                "missing PE signature".to_string(),
            ));
        }

        // COFF file header
        let _machine = reader.u16("Machine")?;
        let section_count = reader.u16("NumberOfSections")? as usize;
        reader.skip(12, "COFF header")?;
        let optional_header_size = reader.u16("SizeOfOptionalHeader")? as usize;
        let _characteristics = reader.u16("Characteristics")?;

        let optional_start = reader.position();
        let magic = reader.u16("optional header magic")?;
        let (rva_count_offset, directories_offset, is_pe32_plus) = match magic {
            PE32_MAGIC => (92, 96, false),
            PE32_PLUS_MAGIC => (108, 112, true),
            other => {
                return Err(MetadataError::NotPortableExecutable(format!(
                    "unknown optional header magic {:#x}",
                    other
                )))
            }
        };

        reader.seek(optional_start + rva_count_offset)?;
        let directory_count = reader.u32("NumberOfRvaAndSizes")? as usize;
        if directory_count <= CLI_HEADER_DIRECTORY
            || directories_offset + (CLI_HEADER_DIRECTORY + 1) * 8 > optional_header_size
        {
            return Err(MetadataError::NotManaged);
        }

        reader.seek(optional_start + directories_offset + CLI_HEADER_DIRECTORY * 8)?;
        let cli_directory = DataDirectory {
            rva: reader.u32("CLI header RVA")?,
            size: reader.u32("CLI header size")?,
        };
        if cli_directory.rva == 0 || cli_directory.size == 0 {
            return Err(MetadataError::NotManaged);
        }

        reader.seek(optional_start + optional_header_size)?;
        let mut sections = Vec::with_capacity(section_count);
        for _ in 0..section_count {
            let header = reader.bytes(SECTION_HEADER_SIZE, "section header")?;
            let mut section = ByteReader::new(header);
            let raw_name = section.bytes(8, "section name")?;
            let name_len = raw_name.iter().position(|b| *b == 0).unwrap_or(8);
            sections.push(Section {
                name: String::from_utf8_lossy(&raw_name[..name_len]).into_owned(),
                virtual_size: section.u32("VirtualSize")?,
                virtual_address: section.u32("VirtualAddress")?,
                raw_size: section.u32("SizeOfRawData")?,
                raw_offset: section.u32("PointerToRawData")?,
            });
        }

        let mut image = Self {
            data,
            is_pe32_plus,
            sections,
            cli_header: CliHeader {
                runtime_major: 0,
                runtime_minor: 0,
                metadata: DataDirectory { rva: 0, size: 0 },
                flags: 0,
                entry_point_token: 0,
            },
        };

        let cli = image.slice_at_rva(cli_directory.rva, 24)?;
        let mut cli_reader = ByteReader::new(cli);
        let _cb = cli_reader.u32("CLI header cb")?;
        image.cli_header = CliHeader {
            runtime_major: cli_reader.u16("MajorRuntimeVersion")?,
            runtime_minor: cli_reader.u16("MinorRuntimeVersion")?,
            metadata: DataDirectory {
                rva: cli_reader.u32("MetaData RVA")?,
                size: cli_reader.u32("MetaData size")?,
            },
            flags: cli_reader.u32("Flags")?,
            entry_point_token: cli_reader.u32("EntryPointToken")?,
        };

        if image.cli_header.metadata.rva == 0 || image.cli_header.metadata.size == 0 {
            return Err(MetadataError::InvalidMetadata(
                "CLI header has an empty metadata directory".to_string(),
            ));
        }

        Ok(image)
    }

    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        self.sections
            .iter()
            .find(|s| s.contains(rva))
            .map(|s| (rva - s.virtual_address) as usize + s.raw_offset as usize)
            .ok_or(MetadataError::UnmappedRva { rva })
    }

    /// `len` bytes of file data starting at `rva`
    pub fn slice_at_rva(&self, rva: u32, len: usize) -> Result<&'a [u8]> {
        let offset = self.rva_to_offset(rva)?;
        let mut reader = ByteReader::at(self.data, offset)?;
        reader.bytes(len, "RVA range")
    }

    /// File data from `rva` to the end of the file
    pub fn tail_at_rva(&self, rva: u32) -> Result<&'a [u8]> {
        let offset = self.rva_to_offset(rva)?;
        self.data
            .get(offset..)
            .ok_or(MetadataError::UnmappedRva { rva })
    }

    pub fn metadata(&self) -> Result<&'a [u8]> {
        let dir = self.cli_header.metadata;
        self.slice_at_rva(dir.rva, dir.size as usize)
    }
}
