//! A minimal walkthrough: build a translator, map a tiny guest program, run one block, and print
//! what happened. Lives under `demos/` rather than `examples/` because this workspace's
//! `examples/` directory is reserved for a read-only retrieval pack.
use a64rt::memory::FlatGuestMemory;
use a64rt::translator::Translator;

fn main() {
    env_logger::init();

    // A tiny guest program at guest address 0x1000:
    //   MOVZ X0, #0x2a        ; X0 = 42
    //   RET
    let words: [u32; 2] = [0xD280_0540, 0xD65F_03C0];
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    let memory = FlatGuestMemory::new(0x1000, &bytes);

    let mut translator = Translator::new().expect("default configuration is always valid");
    translator.state_mut().pc = 0x1000;

    // Guest loads/stores in this tiny demo never execute, so a throwaway scratch page is a valid
    // (if minimal) `mem_base` for the one block we run.
    let mut scratch_mem = [0u8; 4096];
    translator
        .step(&memory, scratch_mem.as_mut_ptr())
        .expect("translating and running this block cannot fail");

    println!("X0 = {:#x}", translator.state().gpr[0]);
    println!("cache stats: {:?}", translator.cache_stats());
}
