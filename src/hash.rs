// Purpose: Provide the 32-bit content-independent hash assigned to user-defined types.
// Inputs/Outputs: Hashes fully-qualified type names into the wire-visible type code.
// Invariants: Must stay bit-compatible with CityHash32; downstream peers compare raw values.
// Gotchas: Do not swap the algorithm; existing artifacts and remote ends carry these codes.

const C1: u32 = 0xcc9e2d51;
const C2: u32 = 0x1b873593;

fn fetch32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn fmix(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

fn mur(mut a: u32, mut h: u32) -> u32 {
    a = a.wrapping_mul(C1);
    a = a.rotate_right(17);
    a = a.wrapping_mul(C2);
    h ^= a;
    h = h.rotate_right(19);
    h.wrapping_mul(5).wrapping_add(0xe6546b64)
}

fn hash32_len_0_to_4(data: &[u8]) -> u32 {
    let mut b: u32 = 0;
    let mut c: u32 = 9;
    for &byte in data {
        b = b.wrapping_mul(C1).wrapping_add(byte as i8 as u32);
        c ^= b;
    }
    fmix(mur(b, mur(data.len() as u32, c)))
}

fn hash32_len_5_to_12(data: &[u8]) -> u32 {
    let len = data.len();
    let mut a = len as u32;
    let mut b = a.wrapping_mul(5);
    let mut c: u32 = 9;
    let d = b;
    a = a.wrapping_add(fetch32(data, 0));
    b = b.wrapping_add(fetch32(data, len - 4));
    c = c.wrapping_add(fetch32(data, (len >> 1) & 4));
    fmix(mur(c, mur(b, mur(a, d))))
}

fn hash32_len_13_to_24(data: &[u8]) -> u32 {
    let len = data.len();
    let a = fetch32(data, (len >> 1) - 4);
    let b = fetch32(data, 4);
    let c = fetch32(data, len - 8);
    let d = fetch32(data, len >> 1);
    let e = fetch32(data, 0);
    let f = fetch32(data, len - 4);
    let h = len as u32;
    fmix(mur(f, mur(e, mur(d, mur(c, mur(b, mur(a, h)))))))
}

/// CityHash32 over a byte slice.
pub fn city_hash32(data: &[u8]) -> u32 {
    let len = data.len();
    if len <= 4 {
        return hash32_len_0_to_4(data);
    }
    if len <= 12 {
        return hash32_len_5_to_12(data);
    }
    if len <= 24 {
        return hash32_len_13_to_24(data);
    }

    let mut h = len as u32;
    let mut g = (len as u32).wrapping_mul(C1);
    let mut f = g;
    let a0 = fetch32(data, len - 4)
        .wrapping_mul(C1)
        .rotate_right(17)
        .wrapping_mul(C2);
    let a1 = fetch32(data, len - 8)
        .wrapping_mul(C1)
        .rotate_right(17)
        .wrapping_mul(C2);
    let a2 = fetch32(data, len - 16)
        .wrapping_mul(C1)
        .rotate_right(17)
        .wrapping_mul(C2);
    let a3 = fetch32(data, len - 12)
        .wrapping_mul(C1)
        .rotate_right(17)
        .wrapping_mul(C2);
    let a4 = fetch32(data, len - 20)
        .wrapping_mul(C1)
        .rotate_right(17)
        .wrapping_mul(C2);
    h ^= a0;
    h = h.rotate_right(19).wrapping_mul(5).wrapping_add(0xe6546b64);
    h ^= a2;
    h = h.rotate_right(19).wrapping_mul(5).wrapping_add(0xe6546b64);
    g ^= a1;
    g = g.rotate_right(19).wrapping_mul(5).wrapping_add(0xe6546b64);
    g ^= a3;
    g = g.rotate_right(19).wrapping_mul(5).wrapping_add(0xe6546b64);
    f = f.wrapping_add(a4);
    f = f.rotate_right(19).wrapping_mul(5).wrapping_add(0xe6546b64);

    let mut offset = 0;
    for _ in 0..(len - 1) / 20 {
        let a0 = fetch32(data, offset)
            .wrapping_mul(C1)
            .rotate_right(17)
            .wrapping_mul(C2);
        let a1 = fetch32(data, offset + 4);
        let a2 = fetch32(data, offset + 8)
            .wrapping_mul(C1)
            .rotate_right(17)
            .wrapping_mul(C2);
        let a3 = fetch32(data, offset + 12)
            .wrapping_mul(C1)
            .rotate_right(17)
            .wrapping_mul(C2);
        let a4 = fetch32(data, offset + 16);
        h ^= a0;
        h = h.rotate_right(18).wrapping_mul(5).wrapping_add(0xe6546b64);
        f = f.wrapping_add(a1);
        f = f.rotate_right(19).wrapping_mul(C1);
        g = g.wrapping_add(a2);
        g = g.rotate_right(18).wrapping_mul(5).wrapping_add(0xe6546b64);
        h ^= a3.wrapping_add(a1);
        h = h.rotate_right(19).wrapping_mul(5).wrapping_add(0xe6546b64);
        g ^= a4;
        g = g.swap_bytes().wrapping_mul(5);
        h = h.wrapping_add(a4.wrapping_mul(5));
        h = h.swap_bytes();
        f = f.wrapping_add(a0);
        // PERMUTE3(f, h, g)
        let tmp = f;
        f = g;
        g = h;
        h = tmp;
        offset += 20;
    }
    g = g.rotate_right(11).wrapping_mul(C1);
    g = g.rotate_right(17).wrapping_mul(C1);
    f = f.rotate_right(11).wrapping_mul(C1);
    f = f.rotate_right(17).wrapping_mul(C1);
    h = h.wrapping_add(g).rotate_right(19);
    h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    h = h.rotate_right(17).wrapping_mul(C1);
    h = h.wrapping_add(f).rotate_right(19);
    h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    h.rotate_right(17).wrapping_mul(C1)
}

pub fn type_hash(fully_qualified_name: &str) -> u32 {
    city_hash32(fully_qualified_name.as_bytes())
}
