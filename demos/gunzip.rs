use std::{cell::RefCell, env, fs::{self, File}, io::Write};

use gzdec::gzdec::{GzDec, Settings};

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: gunzip <input.gz> <output>");
    };

    let compressed = fs::read(&input)?;
    println!("Read {} bytes from {input}", compressed.len());

    let file = RefCell::new(File::create(&output)?);
    let written = RefCell::new(0);

    let mut filter = GzDec::new(Settings::default());
    filter.set_callback(|buffer| {
        let data = buffer.as_slice();
        file.borrow_mut().write_all(data)?;
        *written.borrow_mut() += data.len();

        Ok(())
    });

    filter.chain(compressed)?;

    println!("Wrote {} bytes to {output}", written.borrow());

    Ok(())
}
