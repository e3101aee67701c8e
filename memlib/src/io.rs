use std::fs::File;
use std::io::BufRead;
use crate::error::Result;

/// Gets a line reader over a command script
///
/// On unix the file is memory mapped and read sequentially, elsewhere it is buffered
pub fn get_reader(file: File) -> Result<impl BufRead> {
    // Compatibility on other systems
    #[cfg(not(unix))]
    {
        use std::io::BufReader;
        Ok(BufReader::new(file))
    }
    #[cfg(unix)]
    {
        use std::io::Cursor;
        use memmap2::{Advice, Mmap};
        // SAFETY: the map is read only and lives as long as the returned reader. Scripts are not
        // expected to be modified while a simulation replays them
        let map = unsafe { Mmap::map(&file)? };
        map.advise(Advice::Sequential)?;
        Ok(Cursor::new(map))
    }
}
