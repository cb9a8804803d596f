//! prism-shaders: WGSL shader sources for the OIT render pipeline.
//!
//! The accumulation and resolve shaders are assembled at pipeline-creation
//! time from templates plus the tuning constants (`FRAGMENT_COUNT`,
//! `SAMPLE_COUNT`), so the traversal budget and the multisample count are
//! baked into the modules the same way the rest of the pipeline state is.

/// Opaque forward pass: depth-tested, depth-writing, rendered into the
/// multisampled color/depth pair. Vertices carry pixel-space xy, normalized
/// depth z, and straight-alpha RGBA (alpha is ignored here).
pub const OPAQUE_WGSL: &str = r#"
struct ViewportUniform {
    scale: vec2<f32>,      // 2/W, -2/H
    translate: vec2<f32>,  // (-1, +1)
};

@group(0) @binding(0) var<uniform> vp: ViewportUniform;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_main(@location(0) in_pos: vec3<f32>, @location(1) in_color: vec4<f32>) -> VsOut {
    var out: VsOut;
    let ndc = vec2<f32>(in_pos.x * vp.scale.x + vp.translate.x,
                        in_pos.y * vp.scale.y + vp.translate.y);
    out.pos = vec4<f32>(ndc, in_pos.z, 1.0);
    out.color = in_color;
    return out;
}

@fragment
fn fs_main(inp: VsOut) -> @location(0) vec4<f32> {
    return vec4<f32>(inp.color.rgb, 1.0);
}
"#;

/// Body of the accumulation shader; assembled per sample count by
/// [`accumulate_source`]. No color targets: every visible pixel reserves a
/// node slot from the atomic counter, writes its payload, then splices the
/// node onto that pixel's list head with an atomic exchange. Slots past
/// the pool capacity are dropped without touching the head.
///
/// The shader's storage writes force it to run before the late depth
/// test, so occlusion by opaque geometry is applied here per sub-sample:
/// coverage bits whose opaque depth is at or in front of the fragment are
/// cleared, and a fragment with no surviving bits allocates nothing.
const ACCUMULATE_BODY_WGSL: &str = r#"
struct ViewportUniform {
    scale: vec2<f32>,
    translate: vec2<f32>,
};

@group(0) @binding(0) var<uniform> vp: ViewportUniform;

struct FrameParams {
    width: u32,
    height: u32,
    capacity: u32,
    _pad: u32,
};

struct Node {
    next: u32,
    color: u32,
    depth: u32,
    coverage: u32,
};

@group(1) @binding(0) var<uniform> params: FrameParams;
@group(1) @binding(1) var<storage, read_write> counter: atomic<u32>;
@group(1) @binding(2) var<storage, read_write> heads: array<atomic<u32>>;
@group(1) @binding(3) var<storage, read_write> nodes: array<Node>;
@group(1) @binding(4) var opaque_depth: OPAQUE_DEPTH_TYPE;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_main(@location(0) in_pos: vec3<f32>, @location(1) in_color: vec4<f32>) -> VsOut {
    var out: VsOut;
    let ndc = vec2<f32>(in_pos.x * vp.scale.x + vp.translate.x,
                        in_pos.y * vp.scale.y + vp.translate.y);
    out.pos = vec4<f32>(ndc, in_pos.z, 1.0);
    out.color = in_color;
    return out;
}

@fragment
fn fs_main(inp: VsOut, @builtin(sample_mask) coverage: u32) {
    let px = min(u32(inp.pos.x), params.width - 1u);
    let py = min(u32(inp.pos.y), params.height - 1u);
    let coords = vec2<i32>(i32(px), i32(py));

    var mask = coverage;
    for (var s = 0u; s < SAMPLE_COUNT; s += 1u) {
        if ((mask & (1u << s)) != 0u && inp.pos.z >= OPAQUE_DEPTH_LOAD) {
            mask &= ~(1u << s);
        }
    }
    if (mask == 0u) {
        return;
    }

    let index = atomicAdd(&counter, 1u);
    if (index >= params.capacity) {
        return;
    }
    nodes[index].color = pack4x8unorm(inp.color);
    nodes[index].depth = bitcast<u32>(inp.pos.z);
    nodes[index].coverage = mask;
    let prev = atomicExchange(&heads[py * params.width + px], index);
    nodes[index].next = prev;
}
"#;

/// Assemble the accumulation shader for a sample count. Multisampled and
/// single-sample depth textures are distinct WGSL types, so the binding
/// declaration and the load are substituted along with the constant.
pub fn accumulate_source(sample_count: u32) -> String {
    let (depth_type, depth_load) = if sample_count > 1 {
        (
            "texture_depth_multisampled_2d",
            "textureLoad(opaque_depth, coords, i32(s))",
        )
    } else {
        ("texture_depth_2d", "textureLoad(opaque_depth, coords, 0)")
    };
    format!("const SAMPLE_COUNT: u32 = {sample_count}u;\n")
        + &ACCUMULATE_BODY_WGSL
            .replace("OPAQUE_DEPTH_TYPE", depth_type)
            .replace("OPAQUE_DEPTH_LOAD", depth_load)
}

/// Frame-start clear: every head slot back to the empty sentinel, and the
/// allocation counter rewound to zero. Runs as its own dispatch so the
/// inter-pass barrier orders it before accumulation.
pub const RESET_WGSL: &str = r#"
struct FrameParams {
    width: u32,
    height: u32,
    capacity: u32,
    _pad: u32,
};

@group(0) @binding(0) var<uniform> params: FrameParams;
@group(0) @binding(1) var<storage, read_write> counter: atomic<u32>;
@group(0) @binding(2) var<storage, read_write> heads: array<u32>;

@compute @workgroup_size(64)
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width * params.height) {
        return;
    }
    heads[gid.x] = 0xffffffffu;
    if (gid.x == 0u) {
        atomicStore(&counter, 0u);
    }
}
"#;

/// Body of the resolve compute shader; prefixed with generated constants by
/// [`resolve_source`]. Walks the per-pixel list (at most `FRAGMENT_COUNT`
/// nodes, newest first), sorts by depth bits ascending, then composites
/// back-to-front once per covered sub-sample over the resolved opaque color.
const RESOLVE_BODY_WGSL: &str = r#"
const SENTINEL: u32 = 0xffffffffu;

struct FrameParams {
    width: u32,
    height: u32,
    capacity: u32,
    _pad: u32,
};

struct Node {
    next: u32,
    color: u32,
    depth: u32,
    coverage: u32,
};

@group(0) @binding(0) var<uniform> params: FrameParams;
@group(0) @binding(1) var<storage, read> heads: array<u32>;
@group(0) @binding(2) var<storage, read> nodes: array<Node>;
@group(0) @binding(3) var opaque_tex: texture_2d<f32>;
@group(0) @binding(4) var out_tex: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(8, 8, 1)
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let coords = vec2<i32>(i32(gid.x), i32(gid.y));
    let backdrop = textureLoad(opaque_tex, coords, 0);

    var head = heads[gid.y * params.width + gid.x];
    if (head == SENTINEL) {
        textureStore(out_tex, coords, backdrop);
        return;
    }

    var colors: array<u32, FRAGMENT_COUNT>;
    var depths: array<u32, FRAGMENT_COUNT>;
    var masks: array<u32, FRAGMENT_COUNT>;
    var count = 0u;
    loop {
        if (head == SENTINEL || count >= FRAGMENT_COUNT) {
            break;
        }
        let node = nodes[head];
        colors[count] = node.color;
        depths[count] = node.depth;
        masks[count] = node.coverage;
        count += 1u;
        head = node.next;
    }

    // Insertion sort, nearest-to-camera first. Depth bits of normalized
    // depths compare like the floats they came from.
    for (var i = 1u; i < count; i += 1u) {
        let c = colors[i];
        let d = depths[i];
        let m = masks[i];
        var j = i;
        while (j > 0u && depths[j - 1u] > d) {
            colors[j] = colors[j - 1u];
            depths[j] = depths[j - 1u];
            masks[j] = masks[j - 1u];
            j -= 1u;
        }
        colors[j] = c;
        depths[j] = d;
        masks[j] = m;
    }

    var sum = vec3<f32>(0.0, 0.0, 0.0);
    for (var s = 0u; s < SAMPLE_COUNT; s += 1u) {
        var acc = backdrop.rgb;
        var k = count;
        loop {
            if (k == 0u) {
                break;
            }
            k -= 1u;
            if ((masks[k] & (1u << s)) == 0u) {
                continue;
            }
            let frag = unpack4x8unorm(colors[k]);
            acc = mix(acc, frag.rgb, frag.a);
        }
        sum += acc;
    }

    textureStore(out_tex, coords, vec4<f32>(sum / f32(SAMPLE_COUNT), 1.0));
}
"#;

/// Assemble the resolve shader for a given traversal budget and sample
/// count. The constants are baked into the module, mirroring how the rest
/// of the pipeline fixes them at creation time.
pub fn resolve_source(fragment_budget: u32, sample_count: u32) -> String {
    format!(
        "const FRAGMENT_COUNT: u32 = {fragment_budget}u;\n\
         const SAMPLE_COUNT: u32 = {sample_count}u;\n\
         {RESOLVE_BODY_WGSL}"
    )
}

/// Fullscreen blit of the resolved output texture onto the swapchain view.
/// Uses `textureLoad` with the framebuffer position, so no sampler state and
/// no UV flip to get wrong.
pub const BLIT_WGSL: &str = r#"
@group(0) @binding(0) var src_tex: texture_2d<f32>;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VsOut {
    var pos = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 3.0, -1.0),
        vec2<f32>(-1.0,  3.0),
    );
    var out: VsOut;
    out.pos = vec4<f32>(pos[vi], 0.0, 1.0);
    return out;
}

@fragment
fn fs_main(inp: VsOut) -> @location(0) vec4<f32> {
    return textureLoad(src_tex, vec2<i32>(inp.pos.xy), 0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_wgsl(label: &str, source: &str) -> naga::Module {
        naga::front::wgsl::parse_str(source).unwrap_or_else(|error| {
            panic!(
                "WGSL parse failed for {label}: {}",
                error.emit_to_string(source)
            )
        })
    }

    #[test]
    fn static_sources_parse() {
        parse_wgsl("opaque", OPAQUE_WGSL);
        parse_wgsl("reset", RESET_WGSL);
        parse_wgsl("blit", BLIT_WGSL);
    }

    #[test]
    fn assembled_sources_parse_for_common_configs() {
        for (budget, samples) in [(32, 4), (8, 1), (16, 8), (1, 2)] {
            parse_wgsl("resolve", &resolve_source(budget, samples));
            parse_wgsl("accumulate", &accumulate_source(samples));
        }
    }

    #[test]
    fn accumulate_depth_binding_matches_sample_count() {
        let msaa = accumulate_source(4);
        assert!(msaa.contains("texture_depth_multisampled_2d"));
        let single = accumulate_source(1);
        assert!(single.contains("texture_depth_2d"));
        assert!(!single.contains("multisampled"));
    }

    #[test]
    fn accumulate_rejects_occluded_samples_before_allocating() {
        // The occlusion mask check must precede the counter allocation so
        // hidden fragments consume no pool slots.
        let src = accumulate_source(4);
        let mask_check = src.find("if (mask == 0u)").unwrap();
        let alloc = src.find("atomicAdd(&counter").unwrap();
        assert!(mask_check < alloc);
    }

    #[test]
    fn resolve_source_bakes_constants() {
        let src = resolve_source(24, 2);
        assert!(src.contains("const FRAGMENT_COUNT: u32 = 24u;"));
        assert!(src.contains("const SAMPLE_COUNT: u32 = 2u;"));
    }

    #[test]
    fn entry_points_are_present() {
        let module = parse_wgsl("accumulate", &accumulate_source(4));
        let names: Vec<_> = module
            .entry_points
            .iter()
            .map(|ep| ep.name.as_str())
            .collect();
        assert!(names.contains(&"vs_main"));
        assert!(names.contains(&"fs_main"));

        let module = parse_wgsl("resolve", &resolve_source(32, 4));
        assert_eq!(module.entry_points.len(), 1);
        assert_eq!(module.entry_points[0].name, "cs_main");
    }
}
