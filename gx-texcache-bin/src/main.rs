// Replays a synthetic frame workload against the texture cache with the software backend,
// and reports what the cache did.

use clap::{clap_app, crate_version, value_t};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gxtexcache::*;

const RAM_SIZE: usize = 24 * 1024 * 1024;
const TEXTURE_BASE: u32 = 0x10_0000;
const COPY_BASE: u32 = 0x80_0000;
const TLUT_ADDR: u32 = 0x4_0000;

struct Workload {
    frames:         u32,
    textures:       u32,
    draws:          u32,
    copy_every:     u32,
    write_every:    u32,
}

fn texture_setup(n: u32) -> TextureSetup {
    let addr = TEXTURE_BASE + n * 0x1_0000;
    match n % 4 {
        0 => TextureSetup::new(addr, TextureFormat::RGB565, 64, 64).with_levels(4),
        1 => TextureSetup::new(addr, TextureFormat::I8, 128, 32),
        2 => TextureSetup::new(addr, TextureFormat::C4, 32, 32).with_tlut(TLUT_ADDR, TlutFormat::RGB5A3),
        _ => TextureSetup::new(addr, TextureFormat::RGBA8, 32, 32),
    }
}

fn replay(cache: &mut TextureCache<SoftBackend>, ram: &mut GuestRam, work: &Workload, rng: &mut StdRng) {
    for frame in 0..work.frames {
        cache.cleanup(frame);

        // Game logic: the CPU rewrites a texture now and then.
        if work.write_every > 0 && frame % work.write_every == 0 {
            let setup = texture_setup(rng.gen_range(0..work.textures));
            let mut data = vec![0u8; 0x400];
            rng.fill(&mut data[..]);
            ram.write_block(setup.addr, &data);
            cache.invalidate(setup.addr, data.len() as u32);
        }

        for draw in 0..work.draws {
            let n = (draw + frame) % work.textures;
            let stage = (draw as usize) % 8;
            if cache.load(stage, &texture_setup(n), &*ram).is_none() {
                if let Some(err) = cache.take_error() {
                    warn!("draw {} of frame {}: {}", draw, frame, err);
                    if err.is_fatal() {
                        cache.invalidate_all();
                    }
                }
            }
            cache.bind_textures();
        }

        // Render to texture, then sample the result.
        if work.copy_every > 0 && frame % work.copy_every == 0 {
            let color = [(frame * 7) as u8, (frame * 13) as u8, 0x80, 0xFF];
            cache.backend_mut().efb_mut().fill_color(&Rect::new(0, 0, 128, 128), color);
            let request = EfbCopyRequest {
                dst_addr:       COPY_BASE,
                dst_format:     0x6,
                dst_stride:     TextureFormat::RGBA8.bytes_per_row(64),
                src_format:     PixelFormat::RGB8Z24,
                src_rect:       Rect::new(0, 0, 128, 128),
                is_intensity:   false,
                scale_by_half:  true,
            };
            match cache.copy_render_target_to_texture(&request, ram) {
                Ok(_) => {
                    cache.load(7, &TextureSetup::new(COPY_BASE, TextureFormat::RGBA8, 64, 64), &*ram);
                },
                Err(err) => warn!("EFB copy in frame {} failed: {}", frame, err),
            }
        }

        cache.unbind_textures();
    }
}

fn main() {
    let app = clap_app!(gxtexcache =>
        (version: crate_version!())
        (author: "Simon Cooper")
        (about: "Replays a synthetic workload through the GX texture cache.")
        (@arg frames: -f +takes_value "Number of frames to run (default 600).")
        (@arg textures: -t +takes_value "Number of distinct textures (default 32).")
        (@arg draws: -d +takes_value "Texture loads per frame (default 16).")
        (@arg copies: -c +takes_value "EFB copy every N frames, 0 for none (default 4).")
        (@arg writes: -w +takes_value "CPU texture write every N frames, 0 for none (default 30).")
        (@arg samples: -s +takes_value "Safe texture cache colour samples, 0 hashes everything (default 128).")
        (@arg scale: -x +takes_value "Texture scaling factor (default 1).")
        (@arg seed: --seed +takes_value "Random seed.")
    );

    let cmd_args = app.get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let work = Workload {
        frames:         value_t!(cmd_args, "frames", u32).unwrap_or(600),
        textures:       value_t!(cmd_args, "textures", u32).unwrap_or(32).max(1),
        draws:          value_t!(cmd_args, "draws", u32).unwrap_or(16),
        copy_every:     value_t!(cmd_args, "copies", u32).unwrap_or(4),
        write_every:    value_t!(cmd_args, "writes", u32).unwrap_or(30),
    };
    let scale = value_t!(cmd_args, "scale", u32).unwrap_or(1);
    let config = VideoConfig {
        safe_texture_cache_color_samples:   value_t!(cmd_args, "samples", u32).unwrap_or(128),
        scaling_mode:                       if scale > 1 { ScalingMode::Smooth } else { ScalingMode::Off },
        tex_scaling_factor:                 scale,
        ..VideoConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(value_t!(cmd_args, "seed", u64).unwrap_or(0x1234_5678));

    let mut ram = GuestRam::new(RAM_SIZE);
    for n in 0..work.textures {
        let mut data = vec![0u8; 0x1_0000];
        rng.fill(&mut data[..]);
        ram.write_block(texture_setup(n).addr, &data);
    }
    let mut tlut = vec![0u8; 32];
    rng.fill(&mut tlut[..]);
    ram.write_tmem(TLUT_ADDR, &tlut);

    let mut cache = match TextureCache::new(SoftBackend::new(), config) {
        Ok(cache) => cache,
        Err(err) => panic!("Couldn't create texture cache: {}", err),
    };

    info!("replaying {} frames over {} textures", work.frames, work.textures);
    let start = chrono::Utc::now();
    replay(&mut cache, &mut ram, &work, &mut rng);
    let elapsed = chrono::Utc::now() - start;

    let stats = cache.stats();
    let backend = cache.backend().stats();
    println!("frames:               {}", work.frames);
    println!("time:                 {}ms", elapsed.num_milliseconds());
    println!("loads:                {}", stats.loads);
    println!("address hits:         {}", stats.address_hits);
    println!("hash hits:            {}", stats.hash_hits);
    println!("misses:               {}", stats.misses);
    println!("palette applications: {}", stats.palette_applications);
    println!("partial updates:      {}", stats.partial_updates);
    println!("EFB copies:           {}", stats.efb_copies);
    println!("pool hits/misses:     {}/{}", stats.pool_hits, stats.pool_misses);
    println!("destroyed:            {}", stats.destroyed);
    println!("live entries:         {}", cache.len());
    println!("pool bytes:           {}", cache.pool_bytes());
    println!("textures created:     {}", backend.textures_created);
    println!("uploads:              {}", backend.uploads);
}
